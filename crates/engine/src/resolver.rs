//! Correlation resolver
//!
//! Finds "the instance belonging to this choreography run" by exact
//! equality of correlation maps. Only live instances (CREATED or
//! INITIALIZED) take part.
//!
//! A qualified query narrows in three steps:
//!
//! 1. objects (and elements) by name
//! 2. their live instances by exact correlation-map equality
//! 3. the owning model by namespace and name
//!
//! Zero matches is an ordinary outcome for the `find_*` and `*_exists`
//! queries. The `resolve_*` queries expect exactly one match and report
//! `NotFound` or `AmbiguousCorrelation` otherwise.

use crate::bodies::{
    DataElement, DataElementInstance, DataElementInstanceBody, DataObject,
    DataObjectInstance, DataObjectInstanceBody, DataValue,
};
use crate::context::Context;
use crate::entity::{Entity, EntityBody};
use crate::registry::ListFilter;
use choreo_core::{
    CorrelationProperties, DataElementId, DataElementInstanceId, Error, InstanceState, Result,
};
use std::sync::Arc;

/// Instance bodies carrying a correlation map
pub(crate) trait Correlated: EntityBody<State = InstanceState> {
    fn correlation(&self) -> &CorrelationProperties;
}

impl Correlated for DataObjectInstanceBody {
    fn correlation(&self) -> &CorrelationProperties {
        &self.correlation
    }
}

impl Correlated for DataElementInstanceBody {
    fn correlation(&self) -> &CorrelationProperties {
        &self.correlation
    }
}

/// Check if `instance` is live and its map equals `correlation`
pub(crate) fn is_live_match<B: Correlated>(
    instance: &Entity<B>,
    correlation: &CorrelationProperties,
) -> bool {
    instance.state().is_live() && instance.read(|b| b.correlation().matches(correlation))
}

/// At most one match, or `AmbiguousCorrelation` described by `scope`
pub(crate) fn select_unique<T>(
    mut matches: Vec<T>,
    scope: impl FnOnce() -> String,
) -> Result<Option<T>> {
    match matches.len() {
        0 | 1 => Ok(matches.pop()),
        n => Err(Error::AmbiguousCorrelation {
            scope: scope(),
            matches: n,
        }),
    }
}

/// Read-only query API for external consumers
///
/// # Example
///
/// ```rust
/// use choreo_core::CorrelationProperties;
/// use choreo_engine::{Context, DataModels, DataObjects, Resolver};
///
/// let ctx = Context::in_memory().unwrap();
/// let models = DataModels::new(ctx.clone());
/// let model = models.create("hahnml", "urn:shop", "orders").unwrap();
/// models
///     .compile(
///         model.id(),
///         br#"{"namespace": "urn:shop", "name": "orders", "objects": [
///             {"name": "invoice", "elements": [{"name": "total", "type": "number"}]}
///         ]}"#,
///     )
///     .unwrap();
///
/// let invoice = models.objects(model.id()).unwrap()[0].id();
/// let run = CorrelationProperties::from_pairs([("orderId", "42")]);
/// DataObjects::new(ctx.clone())
///     .instantiate(invoice, "svc1", run.clone())
///     .unwrap();
///
/// let resolver = Resolver::new(ctx);
/// assert!(resolver.object_instance_exists("urn:shop", "orders", "invoice", &run));
/// let slot = resolver
///     .resolve_element_instance("urn:shop", "orders", "invoice", "total", &run)
///     .unwrap();
/// assert!(slot.read(|b| b.values.is_empty()));
/// ```
#[derive(Clone)]
pub struct Resolver {
    ctx: Arc<Context>,
}

impl Resolver {
    /// Create new resolver
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Live object instances matching the qualified name and correlation
    pub fn find_object_instances(
        &self,
        namespace: &str,
        model: &str,
        object: &str,
        correlation: &CorrelationProperties,
    ) -> Vec<Arc<DataObjectInstance>> {
        self.objects_named(object)
            .into_iter()
            .flat_map(|o| self.live_instances_of(&o, correlation))
            .filter(|i| {
                self.ctx
                    .registry()
                    .objects()
                    .find(i.read(|b| b.object))
                    .is_some_and(|o| self.in_model(&o, namespace, model))
            })
            .collect()
    }

    /// The single live object instance for a choreography run
    ///
    /// # Errors
    /// - `NotFound` if nothing matches
    /// - `AmbiguousCorrelation` if more than one instance matches
    pub fn resolve_object_instance(
        &self,
        namespace: &str,
        model: &str,
        object: &str,
        correlation: &CorrelationProperties,
    ) -> Result<Arc<DataObjectInstance>> {
        let scope = || format!("{}:{}/{}", namespace, model, object);
        select_unique(
            self.find_object_instances(namespace, model, object, correlation),
            scope,
        )?
        .ok_or_else(|| {
            Error::not_found("data object instance", format!("{} {}", scope(), correlation))
        })
    }

    /// Check if at least one live object instance matches
    pub fn object_instance_exists(
        &self,
        namespace: &str,
        model: &str,
        object: &str,
        correlation: &CorrelationProperties,
    ) -> bool {
        !self
            .find_object_instances(namespace, model, object, correlation)
            .is_empty()
    }

    /// Live element instances matching the qualified name and correlation
    pub fn find_element_instances(
        &self,
        namespace: &str,
        model: &str,
        object: &str,
        element: &str,
        correlation: &CorrelationProperties,
    ) -> Vec<Arc<DataElementInstance>> {
        self.ctx
            .registry()
            .elements()
            .list_where(&ListFilter::new().name(element))
            .into_iter()
            .filter(|e| self.element_in(e, namespace, model, object))
            .flat_map(|e| {
                e.read(|b| b.instances.clone())
                    .into_iter()
                    .filter_map(|i| self.ctx.registry().element_instances().find(i))
                    .filter(|i| is_live_match(i, correlation))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// The single live element instance for a choreography run
    ///
    /// # Errors
    /// - `NotFound` if nothing matches
    /// - `AmbiguousCorrelation` if more than one instance matches
    pub fn resolve_element_instance(
        &self,
        namespace: &str,
        model: &str,
        object: &str,
        element: &str,
        correlation: &CorrelationProperties,
    ) -> Result<Arc<DataElementInstance>> {
        let scope = || format!("{}:{}/{}/{}", namespace, model, object, element);
        select_unique(
            self.find_element_instances(namespace, model, object, element, correlation),
            scope,
        )?
        .ok_or_else(|| {
            Error::not_found("data element instance", format!("{} {}", scope(), correlation))
        })
    }

    /// Check if at least one live element instance matches
    pub fn element_instance_exists(
        &self,
        namespace: &str,
        model: &str,
        object: &str,
        element: &str,
        correlation: &CorrelationProperties,
    ) -> bool {
        !self
            .find_element_instances(namespace, model, object, element, correlation)
            .is_empty()
    }

    /// Value at `index` of an element instance
    ///
    /// # Errors
    /// `NotFound` if the instance is unknown or holds no value at `index`.
    pub fn get_data_value(
        &self,
        instance: DataElementInstanceId,
        index: usize,
    ) -> Result<Arc<DataValue>> {
        let instance = self.ctx.registry().element_instances().get(instance)?;
        let value = instance
            .read(|b| b.values.get(index).copied())
            .ok_or_else(|| {
                Error::not_found(
                    format!("value of data element instance {}", instance.id()),
                    format!("index {}", index),
                )
            })?;
        self.ctx.registry().values().get(value)
    }

    /// Check if an element's instances hold a list of values
    pub fn is_collection_element(&self, element: DataElementId) -> Result<bool> {
        Ok(self
            .ctx
            .registry()
            .elements()
            .get(element)?
            .read(|b| b.is_collection))
    }

    fn objects_named(&self, name: &str) -> Vec<Arc<DataObject>> {
        self.ctx
            .registry()
            .objects()
            .list_where(&ListFilter::new().name(name))
    }

    fn live_instances_of(
        &self,
        object: &DataObject,
        correlation: &CorrelationProperties,
    ) -> Vec<Arc<DataObjectInstance>> {
        object
            .read(|b| b.instances.clone())
            .into_iter()
            .filter_map(|i| self.ctx.registry().object_instances().find(i))
            .filter(|i| is_live_match(i, correlation))
            .collect()
    }

    fn in_model(&self, object: &DataObject, namespace: &str, model: &str) -> bool {
        object
            .read(|b| b.data_model)
            .and_then(|m| self.ctx.registry().models().find(m))
            .is_some_and(|m| m.read(|b| b.namespace == namespace && b.name == model))
    }

    fn element_in(&self, element: &DataElement, namespace: &str, model: &str, object: &str) -> bool {
        self.ctx
            .registry()
            .objects()
            .find(element.read(|b| b.object))
            .is_some_and(|o| {
                o.read(|b| b.name == object) && self.in_model(&o, namespace, model)
            })
    }
}
