//! Per-kind facades
//!
//! Each facade is a stateless handle over an `Arc<Context>`; clone freely.
//! The module-level `pub(crate)` functions carry the cascade logic so that
//! composites can drive their children without going through ids.
//!
//! ## Facades
//!
//! - [`DataDependencyGraphs`]: source documents compiled into one model
//! - [`DataModels`]: compiled schemas and their objects
//! - [`DataObjects`]: composites of elements, instantiated per run
//! - [`DataElements`]: typed slots of an object
//! - [`DataObjectInstances`]: one object's data for one run
//! - [`DataElementInstances`]: value slots of an object instance
//! - [`DataValues`]: payload holders

pub(crate) mod element_instances;
pub(crate) mod elements;
pub(crate) mod graphs;
pub(crate) mod models;
pub(crate) mod object_instances;
pub(crate) mod objects;
pub(crate) mod values;

pub use element_instances::DataElementInstances;
pub use elements::DataElements;
pub use graphs::DataDependencyGraphs;
pub use models::DataModels;
pub use object_instances::DataObjectInstances;
pub use objects::DataObjects;
pub use values::DataValues;
