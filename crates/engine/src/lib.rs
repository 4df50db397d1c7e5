//! Lifecycle and consistency engine for choreodata
//!
//! This crate orchestrates the lower layers:
//! - Context: explicitly constructed engine instance (open/shutdown)
//! - Registry: one index per entity kind, rebuilt from the entity store
//! - EventBus: bounded lifecycle event channel with an eviction worker
//! - Cascades: archive/unarchive with rollback, delete with reset
//! - Facades: per-kind operations (graphs, models, objects, elements,
//!   instances, values)
//! - Resolver: exact-match correlation queries
//!
//! # Quick Start
//!
//! ```rust
//! use choreo_core::{CorrelationProperties, InstanceState};
//! use choreo_engine::{Context, DataElementInstances, DataElements, DataObjects, DataValues};
//!
//! let ctx = Context::in_memory().unwrap();
//! let objects = DataObjects::new(ctx.clone());
//! let invoice = objects.create("hahnml", "invoice").unwrap();
//! DataElements::new(ctx.clone())
//!     .create(invoice.id(), "hahnml", "total", "number", None, false)
//!     .unwrap();
//!
//! let run = CorrelationProperties::from_pairs([("orderId", "42")]);
//! let instance = objects.instantiate(invoice.id(), "svc1", run).unwrap();
//! let slot = instance.read(|b| b.element_instances[0]);
//!
//! let values = DataValues::new(ctx.clone());
//! let total = values.create("total", "svc1", "number", None).unwrap();
//! values.set_data(total.id(), Some(b"99.50".to_vec())).unwrap();
//! DataElementInstances::new(ctx.clone())
//!     .add_data_value(slot, total.id())
//!     .unwrap();
//!
//! let slot = ctx.registry().element_instances().get(slot).unwrap();
//! assert_eq!(slot.state(), InstanceState::Initialized);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bodies;
mod cascade;
pub mod config;
pub mod context;
pub mod entity;
pub mod events;
pub mod facades;
pub mod registry;
pub mod resolver;

pub use bodies::{
    DataDependencyGraph, DataDependencyGraphBody, DataElement, DataElementBody,
    DataElementInstance, DataElementInstanceBody, DataModel, DataModelBody, DataObject,
    DataObjectBody, DataObjectInstance, DataObjectInstanceBody, DataValue, DataValueBody,
};
pub use config::{ChoreoConfig, CONFIG_FILE_NAME};
pub use context::{
    Collaborators, Context, GRAPH_SOURCE_COLLECTION, MODEL_SOURCE_COLLECTION, VALUE_COLLECTION,
};
pub use entity::{Entity, EntityBody};
pub use events::{EventBus, WORKER_THREAD_NAME};
pub use facades::{
    DataDependencyGraphs, DataElementInstances, DataElements, DataModels, DataObjectInstances,
    DataObjects, DataValues,
};
pub use registry::{Index, ListFilter, Registry};
pub use resolver::Resolver;
