//! DataElements: typed slots of a DataObject
//!
//! An element is created INITIAL, initialized to READY and then attached to
//! its parent object. Its name, value type and content type may be edited
//! only while the parent is free-standing; elements of a compiled model are
//! fixed.

use crate::bodies::{DataElement, DataElementBody};
use crate::context::Context;
use crate::facades::{element_instances, objects};
use crate::registry::ListFilter;
use choreo_compiler::{default_content_type, VALUE_TYPES};
use choreo_core::{DataElementId, DataObjectId, Error, InstanceState, ModelOp, ModelState, Result};
use std::sync::Arc;
use tracing::info;

/// DataElement operations
#[derive(Clone)]
pub struct DataElements {
    ctx: Arc<Context>,
}

impl DataElements {
    /// Create new DataElements facade
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Create an element and attach it to `object`
    ///
    /// The element is registered INITIAL, initialized to READY and added to
    /// the object, which becomes READY if it was INITIAL. Without an explicit
    /// content type the value type's default is used.
    ///
    /// # Errors
    /// - `InvalidInput` for an empty name or an unknown value type
    /// - `IllegalModification` if the object belongs to a data model
    /// - `LifecycleViolation` unless the object is INITIAL or READY
    ///
    /// If attaching fails after registration, the element stays registered
    /// and [`initialize`](Self::initialize) can be retried.
    pub fn create(
        &self,
        object: DataObjectId,
        entity_name: &str,
        name: &str,
        value_type: &str,
        content_type: Option<&str>,
        is_collection: bool,
    ) -> Result<Arc<DataElement>> {
        validate_name(name)?;
        validate_value_type(value_type)?;

        let parent = self.ctx.registry().objects().get(object)?;
        objects::ensure_unprotected(&parent, "create_data_element")?;
        parent.ensure_state(
            &[ModelState::Initial, ModelState::Ready],
            "create_data_element",
        )?;

        let element = Arc::new(DataElement::new(
            DataElementId::new(),
            DataElementBody {
                entity_name: entity_name.to_string(),
                name: name.to_string(),
                value_type: value_type.to_string(),
                content_type: content_type
                    .map(str::to_string)
                    .unwrap_or_else(|| default_content_type(value_type).to_string()),
                is_collection,
                object,
                instances: Vec::new(),
            },
        ));
        self.ctx
            .admit(self.ctx.registry().elements(), Arc::clone(&element))?;
        info!(target: "choreo::registry", id = %element.id(), object = %object, name, "Created data element");

        initialize(&self.ctx, &element)?;
        Ok(element)
    }

    /// Bring an element to READY and attach it to its object
    pub fn initialize(&self, id: DataElementId) -> Result<()> {
        initialize(&self.ctx, &*self.get(id)?)
    }

    /// Look up an element
    pub fn get(&self, id: DataElementId) -> Result<Arc<DataElement>> {
        self.ctx.registry().elements().get(id)
    }

    /// Elements matching `filter`
    pub fn list_where(&self, filter: &ListFilter) -> Vec<Arc<DataElement>> {
        self.ctx.registry().elements().list_where(filter)
    }

    /// Rename an element of a free-standing object
    pub fn rename(&self, id: DataElementId, name: &str) -> Result<()> {
        validate_name(name)?;
        self.edit(id, "rename", |b| b.name = name.to_string())
    }

    /// Change the value type of an element of a free-standing object
    pub fn set_type(&self, id: DataElementId, value_type: &str) -> Result<()> {
        validate_value_type(value_type)?;
        self.edit(id, "set_type", |b| b.value_type = value_type.to_string())
    }

    /// Change the content type of an element of a free-standing object
    pub fn set_content_type(&self, id: DataElementId, content_type: &str) -> Result<()> {
        if content_type.trim().is_empty() {
            return Err(Error::invalid_input("content type must not be empty"));
        }
        self.edit(id, "set_content_type", |b| {
            b.content_type = content_type.to_string()
        })
    }

    /// Archive an element (READY -> ARCHIVED)
    ///
    /// An object left without a READY element resets to INITIAL.
    pub fn archive(&self, id: DataElementId) -> Result<()> {
        self.with_parent(id, archive)
    }

    /// Unarchive an element (ARCHIVED -> READY)
    ///
    /// An INITIAL object becomes READY again.
    pub fn unarchive(&self, id: DataElementId) -> Result<()> {
        self.with_parent(id, unarchive)
    }

    /// Run `op` under the parent object's lock, then re-derive its state
    fn with_parent(
        &self,
        id: DataElementId,
        op: fn(&Context, &DataElement) -> Result<()>,
    ) -> Result<()> {
        let element = self.get(id)?;
        match self.ctx.registry().objects().find(element.read(|b| b.object)) {
            Some(parent) => {
                let _guard = parent.lock();
                op(&self.ctx, &element)?;
                objects::sync_state(&self.ctx, &parent)?;
                Ok(())
            }
            None => op(&self.ctx, &element),
        }
    }

    /// Delete an element of a free-standing object with its instances
    ///
    /// An attached element is removed through its object, which resets to
    /// INITIAL when left empty.
    ///
    /// # Errors
    /// `IllegalModification` if the element belongs to a data model.
    pub fn delete(&self, id: DataElementId) -> Result<()> {
        let element = self.get(id)?;
        let parent_id = element.read(|b| b.object);
        if let Some(parent) = self.ctx.registry().objects().find(parent_id) {
            if parent.read(|b| b.is_model_owned()) {
                return Err(protected(&element, "delete"));
            }
            if parent.read(|b| b.elements.contains(&id)) {
                return objects::delete_element(&self.ctx, &parent, id);
            }
        }
        delete_cascade(&self.ctx, &element)?;
        self.ctx.registry().elements().remove(id);
        Ok(())
    }

    fn edit(
        &self,
        id: DataElementId,
        operation: &str,
        f: impl FnOnce(&mut DataElementBody),
    ) -> Result<()> {
        let element = self.get(id)?;
        let _guard = element.lock();
        if is_protected(&self.ctx, &element) {
            return Err(protected(&element, operation));
        }
        element.ensure_state(
            &[ModelState::Initial, ModelState::Ready, ModelState::Archived],
            operation,
        )?;
        element.update(f);
        self.ctx.persist(&element)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid_input("element name must not be empty"));
    }
    Ok(())
}

fn validate_value_type(value_type: &str) -> Result<()> {
    if !VALUE_TYPES.contains(&value_type) {
        return Err(Error::invalid_input(format!(
            "unknown value type '{}', expected one of {}",
            value_type,
            VALUE_TYPES.join(", ")
        )));
    }
    Ok(())
}

fn is_protected(ctx: &Context, element: &DataElement) -> bool {
    ctx.registry()
        .objects()
        .find(element.read(|b| b.object))
        .map(|o| o.read(|b| b.is_model_owned()))
        .unwrap_or(false)
}

fn protected(element: &DataElement, operation: &str) -> Error {
    Error::illegal_modification(
        element.kind(),
        element.uuid(),
        format!("{} on an element owned by a data model", operation),
    )
}

pub(crate) fn initialize(ctx: &Context, element: &DataElement) -> Result<()> {
    {
        let _guard = element.lock();
        match element.state() {
            ModelState::Initial => {
                ctx.apply(element, ModelOp::Ready)?;
            }
            ModelState::Ready => {}
            state => return Err(element.violation(state, "initialize")),
        }
    }
    let parent = ctx.registry().objects().get(element.read(|b| b.object))?;
    objects::add_element(ctx, &parent, element)
}

pub(crate) fn archive(ctx: &Context, element: &DataElement) -> Result<()> {
    let _guard = element.lock();
    ctx.apply(element, ModelOp::Archive)?;
    Ok(())
}

pub(crate) fn unarchive(ctx: &Context, element: &DataElement) -> Result<()> {
    let _guard = element.lock();
    ctx.apply(element, ModelOp::Unarchive)?;
    Ok(())
}

/// Delete the element's instances, then the element
pub(crate) fn delete_cascade(ctx: &Context, element: &DataElement) -> Result<()> {
    let _guard = element.lock();
    element.ensure_state(
        &[ModelState::Initial, ModelState::Ready, ModelState::Archived],
        "delete",
    )?;
    let instances = element.read(|b| b.instances.clone());
    for id in &instances {
        if let Some(instance) = ctx.registry().element_instances().find(*id) {
            if instance.state() != InstanceState::Deleted {
                element_instances::delete(ctx, &instance)?;
            }
        }
    }
    ctx.apply(element, ModelOp::Delete)?;
    Ok(())
}
