//! choreodata - data-tracking middleware for service choreographies
//!
//! Tracks the data a choreography's participants exchange: schemas compiled
//! from data dependency graphs, their objects and elements, per-run
//! instances found by correlation properties, and the values attached to
//! them. Every entity follows a guarded lifecycle; composites cascade
//! archive, unarchive and delete over their children.
//!
//! # Quick Start
//!
//! ```rust
//! use choreodata::{Context, DataDependencyGraphs, ModelState};
//!
//! let ctx = Context::in_memory().unwrap();
//! let graphs = DataDependencyGraphs::new(ctx);
//! let graph = graphs.create("hahnml", "shop", "urn:shop").unwrap();
//! graphs
//!     .set_source(
//!         graph.id(),
//!         br#"{"namespace": "urn:shop", "name": "orders", "objects": [
//!             {"name": "invoice", "elements": [{"name": "total", "type": "number"}]}
//!         ]}"#,
//!     )
//!     .unwrap();
//! assert_eq!(graph.state(), ModelState::Ready);
//! ```

pub use choreo_core::{
    CascadeDirection, CompilationIssue, CorrelationProperties, DataDependencyGraphId,
    DataElementId, DataElementInstanceId, DataModelId, DataObjectId, DataObjectInstanceId,
    DataValueId, EntityId, EntityKind, EntityState, Error, InstanceState, LifecycleEvent,
    LifecycleListener, ModelState, Result, Severity,
};
pub use choreo_engine::*;
