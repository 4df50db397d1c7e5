//! DataElementInstances: the value slots of one object instance
//!
//! An element instance is CREATED while it holds no values and INITIALIZED
//! while it holds at least one. Adding or removing a value updates both the
//! instance and the value's association list, under the instance's
//! operation lock and then the value's.
//!
//! A non-collection element instance holds a single value; adding another
//! one replaces it and drops the old value's association.

use crate::bodies::{DataElementInstance, DataValue};
use crate::context::Context;
use crate::registry::ListFilter;
use choreo_core::{DataElementInstanceId, DataValueId, InstanceOp, InstanceState, Result};
use std::sync::Arc;
use tracing::debug;

/// DataElementInstance operations
#[derive(Clone)]
pub struct DataElementInstances {
    ctx: Arc<Context>,
}

impl DataElementInstances {
    /// Create new DataElementInstances facade
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Look up an element instance
    pub fn get(&self, id: DataElementInstanceId) -> Result<Arc<DataElementInstance>> {
        self.ctx.registry().element_instances().get(id)
    }

    /// Element instances matching `filter`
    pub fn list_where(&self, filter: &ListFilter) -> Vec<Arc<DataElementInstance>> {
        self.ctx.registry().element_instances().list_where(filter)
    }

    /// Values held, in insertion order
    pub fn values(&self, id: DataElementInstanceId) -> Result<Vec<Arc<DataValue>>> {
        let instance = self.get(id)?;
        Ok(instance
            .read(|b| b.values.clone())
            .into_iter()
            .filter_map(|v| self.ctx.registry().values().find(v))
            .collect())
    }

    /// Add a value; the first one moves the instance to INITIALIZED
    ///
    /// Adding a value already held changes nothing.
    ///
    /// # Errors
    /// `LifecycleViolation` unless both the instance and the value are
    /// CREATED or INITIALIZED.
    pub fn add_data_value(&self, id: DataElementInstanceId, value: DataValueId) -> Result<()> {
        let instance = self.get(id)?;
        let value = self.ctx.registry().values().get(value)?;
        add_value(&self.ctx, &instance, &value)
    }

    /// Remove a value; removing the last one moves the instance back to CREATED
    pub fn remove_data_value(&self, id: DataElementInstanceId, value: DataValueId) -> Result<()> {
        remove_value(&self.ctx, &*self.get(id)?, value)
    }

    /// Archive (CREATED/INITIALIZED -> ARCHIVED)
    pub fn archive(&self, id: DataElementInstanceId) -> Result<()> {
        archive(&self.ctx, &*self.get(id)?)
    }

    /// Unarchive, restoring the state held before archiving
    pub fn unarchive(&self, id: DataElementInstanceId) -> Result<()> {
        unarchive(&self.ctx, &*self.get(id)?)
    }

    /// Delete; associated values keep their association entries
    pub fn delete(&self, id: DataElementInstanceId) -> Result<()> {
        delete(&self.ctx, &*self.get(id)?)?;
        self.ctx.registry().element_instances().remove(id);
        Ok(())
    }
}

pub(crate) fn add_value(ctx: &Context, instance: &DataElementInstance, value: &DataValue) -> Result<()> {
    let _guard = instance.lock();
    instance.ensure_state(
        &[InstanceState::Created, InstanceState::Initialized],
        "add_data_value",
    )?;
    if instance.read(|b| b.values.contains(&value.id())) {
        return Ok(());
    }
    let element = ctx.registry().elements().get(instance.read(|b| b.element))?;
    let is_collection = element.read(|b| b.is_collection);

    {
        let _value_guard = value.lock();
        value.ensure_state(
            &[InstanceState::Created, InstanceState::Initialized],
            "associate",
        )?;
        value.update(|b| {
            if !b.associations.contains(&instance.id()) {
                b.associations.push(instance.id());
            }
        });
        ctx.persist(value)?;
    }

    let displaced = instance.update(|b| {
        let displaced = if is_collection {
            Vec::new()
        } else {
            std::mem::take(&mut b.values)
        };
        b.values.push(value.id());
        displaced
    });
    for old in displaced {
        detach_value(ctx, instance.id(), old)?;
        debug!(target: "choreo::registry", instance = %instance.id(), value = %old, "Replaced single value");
    }

    if instance.state() == InstanceState::Created {
        ctx.apply(instance, InstanceOp::Initialize)?;
    } else {
        ctx.persist(instance)?;
    }
    Ok(())
}

pub(crate) fn remove_value(
    ctx: &Context,
    instance: &DataElementInstance,
    value: DataValueId,
) -> Result<()> {
    let _guard = instance.lock();
    instance.ensure_state(
        &[InstanceState::Created, InstanceState::Initialized],
        "remove_data_value",
    )?;
    let removed = instance.update(|b| {
        let before = b.values.len();
        b.values.retain(|v| *v != value);
        b.values.len() != before
    });
    detach_value(ctx, instance.id(), value)?;

    if !removed {
        return Ok(());
    }
    if instance.read(|b| b.values.is_empty()) && instance.state() == InstanceState::Initialized {
        ctx.apply(instance, InstanceOp::Create)?;
    } else {
        ctx.persist(instance)?;
    }
    Ok(())
}

/// Drop `instance` from the value's association list
fn detach_value(ctx: &Context, instance: DataElementInstanceId, value: DataValueId) -> Result<()> {
    if let Some(value) = ctx.registry().values().find(value) {
        let _guard = value.lock();
        let changed = value.update(|b| {
            let before = b.associations.len();
            b.associations.retain(|i| *i != instance);
            b.associations.len() != before
        });
        if changed {
            ctx.persist(&value)?;
        }
    }
    Ok(())
}

pub(crate) fn archive(ctx: &Context, instance: &DataElementInstance) -> Result<()> {
    let _guard = instance.lock();
    ctx.apply(instance, InstanceOp::Archive)?;
    Ok(())
}

pub(crate) fn unarchive(ctx: &Context, instance: &DataElementInstance) -> Result<()> {
    let _guard = instance.lock();
    ctx.apply(instance, InstanceOp::Unarchive)?;
    Ok(())
}

/// Delete and detach from the element and the object instance
pub(crate) fn delete(ctx: &Context, instance: &DataElementInstance) -> Result<()> {
    let _guard = instance.lock();
    ctx.apply(instance, InstanceOp::Delete)?;

    let (element, object_instance) = instance.read(|b| (b.element, b.object_instance));
    let id = instance.id();
    if let Some(element) = ctx.registry().elements().find(element) {
        element.update(|b| b.instances.retain(|i| *i != id));
        ctx.persist(&element)?;
    }
    if let Some(parent) = ctx.registry().object_instances().find(object_instance) {
        parent.update(|b| b.element_instances.retain(|i| *i != id));
        ctx.persist(&parent)?;
    }
    Ok(())
}
