//! Core types and traits for choreodata
//!
//! This crate defines the foundational types used throughout the system:
//! - Typed identifiers and EntityKind
//! - Error: error taxonomy shared by every crate
//! - Lifecycle flavors (model-object, instance) and the CAS StateCell
//! - LifecycleEvent and LifecycleListener
//! - CorrelationProperties: immutable instance correlation maps
//! - Collaborator contracts: SchemaCompiler, PersistenceProvider, EntityStore

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compile;
pub mod correlation;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod state_cell;
pub mod traits;
pub mod types;

pub use compile::{
    CompilationIssue, CompileOutput, ElementTree, ModelTree, ObjectTree, SchemaCompiler,
    Severity, SourcePosition,
};
pub use correlation::CorrelationProperties;
pub use error::{CascadeDirection, Error, Result};
pub use event::{LifecycleEvent, LifecycleListener};
pub use lifecycle::{EntityState, InstanceOp, InstanceState, LifecycleState, ModelOp, ModelState};
pub use state_cell::{CellSnapshot, StateCell, Transition, TransitionError};
pub use traits::{EntityRecord, EntityStore, PersistenceProvider};
pub use types::{
    DataDependencyGraphId, DataElementId, DataElementInstanceId, DataModelId, DataObjectId,
    DataObjectInstanceId, DataValueId, EntityId, EntityKind,
};
