//! DataObjects: composite of elements, instantiated per choreography run
//!
//! ## Parent State
//!
//! A DataObject is READY iff it holds at least one READY element. Adding
//! the first element moves it INITIAL -> READY; removing the last one
//! resets it to INITIAL. Only a READY object can be instantiated.
//!
//! ## Cascades
//!
//! - `archive` / `unarchive` walk the elements in insertion order with
//!   rollback (see [`crate::cascade`])
//! - `delete` deletes every instance, then every element; a failure resets
//!   the object to INITIAL and surfaces as `DeletionFailed`
//!
//! ## Protection
//!
//! Objects produced by compiling a model reject renames, element edits and
//! individual deletion with `IllegalModification`.

use crate::bodies::{
    DataElement, DataElementInstance, DataElementInstanceBody, DataObject, DataObjectBody,
    DataObjectInstance, DataObjectInstanceBody,
};
use crate::cascade;
use crate::context::Context;
use crate::facades::{elements, object_instances};
use crate::registry::ListFilter;
use crate::resolver;
use choreo_core::{
    CascadeDirection, CorrelationProperties, DataElementId, DataElementInstanceId, DataObjectId,
    DataObjectInstanceId, Error, InstanceState, LifecycleState, ModelOp, ModelState,
    Result,
};
use std::sync::Arc;
use tracing::info;

/// DataObject operations
///
/// Stateless facade over a [`Context`].
///
/// # Example
///
/// ```rust
/// use choreo_core::{CorrelationProperties, InstanceState, ModelState};
/// use choreo_engine::{Context, DataElements, DataObjects};
///
/// let ctx = Context::in_memory().unwrap();
/// let objects = DataObjects::new(ctx.clone());
/// let elements = DataElements::new(ctx.clone());
///
/// let invoice = objects.create("hahnml", "invoice").unwrap();
/// elements
///     .create(invoice.id(), "hahnml", "total", "number", None, false)
///     .unwrap();
/// assert_eq!(invoice.state(), ModelState::Ready);
///
/// let run = CorrelationProperties::from_pairs([("orderId", "42")]);
/// let instance = objects.instantiate(invoice.id(), "svc1", run).unwrap();
/// assert_eq!(instance.state(), InstanceState::Created);
/// ```
#[derive(Clone)]
pub struct DataObjects {
    ctx: Arc<Context>,
}

impl DataObjects {
    /// Create new DataObjects facade
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Create a free-standing object in INITIAL
    pub fn create(&self, entity_name: &str, name: &str) -> Result<Arc<DataObject>> {
        require_name("object name", name)?;
        let object = Arc::new(DataObject::new(
            DataObjectId::new(),
            DataObjectBody {
                entity_name: entity_name.to_string(),
                name: name.to_string(),
                data_model: None,
                elements: Vec::new(),
                instances: Vec::new(),
            },
        ));
        self.ctx
            .admit(self.ctx.registry().objects(), Arc::clone(&object))?;
        info!(target: "choreo::registry", id = %object.id(), name, "Created data object");
        Ok(object)
    }

    /// Look up an object
    pub fn get(&self, id: DataObjectId) -> Result<Arc<DataObject>> {
        self.ctx.registry().objects().get(id)
    }

    /// Objects matching `filter`
    pub fn list_where(&self, filter: &ListFilter) -> Vec<Arc<DataObject>> {
        self.ctx.registry().objects().list_where(filter)
    }

    /// Elements in insertion order
    pub fn elements(&self, id: DataObjectId) -> Result<Vec<Arc<DataElement>>> {
        Ok(element_children(&self.ctx, &*self.get(id)?))
    }

    /// Instances in creation order
    pub fn instances(&self, id: DataObjectId) -> Result<Vec<Arc<DataObjectInstance>>> {
        let object = self.get(id)?;
        let ids = object.read(|b| b.instances.clone());
        Ok(ids
            .into_iter()
            .filter_map(|i| self.ctx.registry().object_instances().find(i))
            .collect())
    }

    /// Attach a READY element; an INITIAL object becomes READY
    ///
    /// Legal while the object is INITIAL or READY. Adding an element that is
    /// already attached changes nothing.
    pub fn add_data_element(&self, id: DataObjectId, element: DataElementId) -> Result<()> {
        let object = self.get(id)?;
        let element = self.ctx.registry().elements().get(element)?;
        ensure_unprotected(&object, "add_data_element")?;
        add_element(&self.ctx, &object, &element)
    }

    /// Detach and delete an element; an object left empty resets to INITIAL
    pub fn delete_data_element(&self, id: DataObjectId, element: DataElementId) -> Result<()> {
        let object = self.get(id)?;
        ensure_unprotected(&object, "delete_data_element")?;
        delete_element(&self.ctx, &object, element)
    }

    /// Rename a free-standing object
    pub fn rename(&self, id: DataObjectId, name: &str) -> Result<()> {
        require_name("object name", name)?;
        let object = self.get(id)?;
        let _guard = object.lock();
        ensure_unprotected(&object, "rename")?;
        object.update(|b| b.name = name.to_string());
        self.ctx.persist(&object)
    }

    /// Archive the object and its elements (READY -> ARCHIVED)
    pub fn archive(&self, id: DataObjectId) -> Result<()> {
        archive(&self.ctx, &*self.get(id)?)
    }

    /// Unarchive the object and its elements (ARCHIVED -> READY)
    pub fn unarchive(&self, id: DataObjectId) -> Result<()> {
        unarchive(&self.ctx, &*self.get(id)?)
    }

    /// Delete a free-standing object with its instances and elements
    ///
    /// # Errors
    /// - `IllegalModification` for a model-owned object
    /// - `DeletionFailed` if the cascade failed; the object is then INITIAL
    pub fn delete(&self, id: DataObjectId) -> Result<()> {
        let object = self.get(id)?;
        ensure_unprotected(&object, "delete")?;
        delete_cascade(&self.ctx, &object)?;
        self.ctx.registry().objects().remove(id);
        Ok(())
    }

    /// Instance of this object for a choreography run
    ///
    /// Returns the live instance whose correlation map equals `correlation`
    /// if there is one; otherwise creates a CREATED instance with one
    /// CREATED element instance per element.
    ///
    /// # Errors
    /// - `LifecycleViolation` unless the object is READY
    /// - `AmbiguousCorrelation` if several live instances match
    pub fn instantiate(
        &self,
        id: DataObjectId,
        created_by: &str,
        correlation: CorrelationProperties,
    ) -> Result<Arc<DataObjectInstance>> {
        let object = self.get(id)?;
        let _guard = object.lock();
        object.ensure_state(&[ModelState::Ready], "instantiate")?;

        if let Some(existing) = find_live_instance(&self.ctx, &object, &correlation)? {
            return Ok(existing);
        }

        let instance = Arc::new(DataObjectInstance::new(
            DataObjectInstanceId::new(),
            DataObjectInstanceBody {
                created_by: created_by.to_string(),
                correlation: correlation.clone(),
                object: object.id(),
                element_instances: Vec::new(),
            },
        ));
        self.ctx
            .admit(self.ctx.registry().object_instances(), Arc::clone(&instance))?;

        let mut created = Vec::new();
        for element in element_children(&self.ctx, &object) {
            if element.state() != ModelState::Ready {
                continue;
            }
            let element_instance = Arc::new(DataElementInstance::new(
                DataElementInstanceId::new(),
                DataElementInstanceBody {
                    created_by: created_by.to_string(),
                    correlation: correlation.clone(),
                    element: element.id(),
                    object_instance: instance.id(),
                    values: Vec::new(),
                },
            ));
            self.ctx.admit(
                self.ctx.registry().element_instances(),
                Arc::clone(&element_instance),
            )?;
            element.update(|b| b.instances.push(element_instance.id()));
            self.ctx.persist(&element)?;
            created.push(element_instance.id());
        }

        instance.update(|b| b.element_instances = created);
        self.ctx.persist(&instance)?;
        object.update(|b| b.instances.push(instance.id()));
        self.ctx.persist(&object)?;

        info!(
            target: "choreo::registry",
            object = %object.id(),
            instance = %instance.id(),
            correlation = %correlation,
            "Instantiated data object"
        );
        Ok(instance)
    }

    /// Live instance whose correlation map equals `correlation`
    ///
    /// # Errors
    /// `AmbiguousCorrelation` if several live instances match.
    pub fn find_instance(
        &self,
        id: DataObjectId,
        correlation: &CorrelationProperties,
    ) -> Result<Option<Arc<DataObjectInstance>>> {
        find_live_instance(&self.ctx, &*self.get(id)?, correlation)
    }
}

fn require_name(what: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid_input(format!("{} must not be empty", what)));
    }
    Ok(())
}

fn find_live_instance(
    ctx: &Context,
    object: &DataObject,
    correlation: &CorrelationProperties,
) -> Result<Option<Arc<DataObjectInstance>>> {
    let ids = object.read(|b| b.instances.clone());
    let matches = ids
        .into_iter()
        .filter_map(|i| ctx.registry().object_instances().find(i))
        .filter(|i| resolver::is_live_match(i, correlation))
        .collect();
    resolver::select_unique(matches, || {
        object.read(|b| format!("data object '{}' ({})", b.name, object.id()))
    })
}

pub(crate) fn ensure_unprotected(object: &DataObject, operation: &str) -> Result<()> {
    if object.read(|b| b.is_model_owned()) {
        return Err(Error::illegal_modification(
            object.kind(),
            object.uuid(),
            format!("{} on an object owned by a data model", operation),
        ));
    }
    Ok(())
}

/// Registered, not yet deleted elements in insertion order
pub(crate) fn element_children(ctx: &Context, object: &DataObject) -> Vec<Arc<DataElement>> {
    let ids = object.read(|b| b.elements.clone());
    ids.into_iter()
        .filter_map(|e| ctx.registry().elements().find(e))
        .filter(|e| !e.state().is_terminal())
        .collect()
}

/// Bring the object's state in line with its elements
///
/// A READY object without a READY element resets to INITIAL; an INITIAL
/// object with one becomes READY. Returns whether a transition ran. The
/// caller holds the object's operation lock.
pub(crate) fn sync_state(ctx: &Context, object: &DataObject) -> Result<bool> {
    let any_ready = element_children(ctx, object)
        .iter()
        .any(|e| e.state() == ModelState::Ready);
    let op = match object.state() {
        ModelState::Ready if !any_ready => ModelOp::Reset,
        ModelState::Initial if any_ready => ModelOp::Ready,
        _ => return Ok(false),
    };
    ctx.apply(object, op)?;
    Ok(true)
}

pub(crate) fn add_element(ctx: &Context, object: &DataObject, element: &DataElement) -> Result<()> {
    let _guard = object.lock();
    object.ensure_state(&[ModelState::Initial, ModelState::Ready], "add_data_element")?;

    let element_state = element.state();
    if element_state != ModelState::Ready {
        return Err(element.violation(element_state, "add_data_element"));
    }
    if element.read(|b| b.object) != object.id() {
        return Err(Error::invalid_input(format!(
            "data element {} belongs to another data object",
            element.id()
        )));
    }

    let added = object.update(|b| {
        if b.elements.contains(&element.id()) {
            false
        } else {
            b.elements.push(element.id());
            true
        }
    });

    if object.state() == ModelState::Initial {
        ctx.apply(object, ModelOp::Ready)?;
    } else if added {
        ctx.persist(object)?;
    }
    Ok(())
}

pub(crate) fn delete_element(
    ctx: &Context,
    object: &DataObject,
    element_id: DataElementId,
) -> Result<()> {
    let _guard = object.lock();
    object.ensure_state(&[ModelState::Initial, ModelState::Ready], "delete_data_element")?;

    let position = object
        .read(|b| b.elements.iter().position(|e| *e == element_id))
        .ok_or_else(|| {
            Error::not_found(format!("data element of data object {}", object.id()), element_id)
        })?;
    let element = ctx.registry().elements().get(element_id)?;

    object.update(|b| b.elements.remove(position));
    if let Err(e) = elements::delete_cascade(ctx, &element) {
        object.update(|b| b.elements.insert(position, element_id));
        return Err(e);
    }
    ctx.registry().elements().remove(element_id);

    if object.state() != ModelState::Ready || !sync_state(ctx, object)? {
        ctx.persist(object)?;
    }
    Ok(())
}

pub(crate) fn archive(ctx: &Context, object: &DataObject) -> Result<()> {
    let _guard = object.lock();
    object.ensure_state(&[ModelState::Ready], "archive")?;
    let children = element_children(ctx, object);
    cascade::reversible(
        object.kind(),
        object.uuid(),
        CascadeDirection::Archive,
        &children,
        |e| e.uuid(),
        |e| elements::archive(ctx, e),
        |e| elements::unarchive(ctx, e),
    )?;
    ctx.apply(object, ModelOp::Archive)?;
    Ok(())
}

pub(crate) fn unarchive(ctx: &Context, object: &DataObject) -> Result<()> {
    let _guard = object.lock();
    object.ensure_state(&[ModelState::Archived], "unarchive")?;
    let children = element_children(ctx, object);
    cascade::reversible(
        object.kind(),
        object.uuid(),
        CascadeDirection::Unarchive,
        &children,
        |e| e.uuid(),
        |e| elements::unarchive(ctx, e),
        |e| elements::archive(ctx, e),
    )?;
    ctx.apply(object, ModelOp::Unarchive)?;
    Ok(())
}

/// Delete instances, then elements, then the object itself
///
/// Ignores protection; whole-model deletion goes through here.
pub(crate) fn delete_cascade(ctx: &Context, object: &DataObject) -> Result<()> {
    let _guard = object.lock();
    object.ensure_state(
        &[ModelState::Initial, ModelState::Ready, ModelState::Archived],
        "delete",
    )?;

    let (instances, element_ids) = object.read(|b| (b.instances.clone(), b.elements.clone()));

    let result = cascade::run_to_completion(&instances, |id| {
        if let Some(instance) = ctx.registry().object_instances().find(*id) {
            if instance.state() != InstanceState::Deleted {
                object_instances::delete_cascade(ctx, &instance)?;
            }
        }
        object.update(|b| b.instances.retain(|i| i != id));
        Ok(())
    })
    .and_then(|()| {
        cascade::run_to_completion(&element_ids, |id| {
            if let Some(element) = ctx.registry().elements().find(*id) {
                if element.state() != ModelState::Deleted {
                    elements::delete_cascade(ctx, &element)?;
                }
            }
            object.update(|b| b.elements.retain(|e| e != id));
            Ok(())
        })
    })
    .and_then(|()| ctx.apply(object, ModelOp::Delete).map(drop));

    match result {
        Ok(()) => {
            info!(target: "choreo::cascade", id = %object.id(), "Deleted data object");
            Ok(())
        }
        Err(cause) => {
            forget_deleted_children(ctx, object);
            Err(cascade::deletion_failed(ctx, object, cause))
        }
    }
}

/// Drop ids of children that are gone or DELETED from the object's lists
fn forget_deleted_children(ctx: &Context, object: &DataObject) {
    let registry = ctx.registry();
    object.update(|b| {
        b.instances.retain(|i| {
            registry
                .object_instances()
                .find(*i)
                .is_some_and(|inst| !inst.state().is_terminal())
        });
        b.elements.retain(|e| {
            registry
                .elements()
                .find(*e)
                .is_some_and(|el| !el.state().is_terminal())
        });
    });
}
