//! DataObjectInstances: one object's data for one choreography run

use crate::bodies::{DataElementInstance, DataObjectInstance};
use crate::cascade;
use crate::context::Context;
use crate::facades::element_instances;
use crate::registry::ListFilter;
use choreo_core::{CascadeDirection, DataObjectInstanceId, InstanceOp, InstanceState, Result};
use std::sync::Arc;
use tracing::info;

/// DataObjectInstance operations
#[derive(Clone)]
pub struct DataObjectInstances {
    ctx: Arc<Context>,
}

impl DataObjectInstances {
    /// Create new DataObjectInstances facade
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Look up an object instance
    pub fn get(&self, id: DataObjectInstanceId) -> Result<Arc<DataObjectInstance>> {
        self.ctx.registry().object_instances().get(id)
    }

    /// Object instances matching `filter`
    pub fn list_where(&self, filter: &ListFilter) -> Vec<Arc<DataObjectInstance>> {
        self.ctx.registry().object_instances().list_where(filter)
    }

    /// Element instances in element order
    pub fn element_instances(&self, id: DataObjectInstanceId) -> Result<Vec<Arc<DataElementInstance>>> {
        Ok(children(&self.ctx, &*self.get(id)?))
    }

    /// Archive the instance and its element instances
    pub fn archive(&self, id: DataObjectInstanceId) -> Result<()> {
        archive(&self.ctx, &*self.get(id)?)
    }

    /// Unarchive the instance and its element instances
    pub fn unarchive(&self, id: DataObjectInstanceId) -> Result<()> {
        unarchive(&self.ctx, &*self.get(id)?)
    }

    /// Delete the element instances, then the instance
    pub fn delete(&self, id: DataObjectInstanceId) -> Result<()> {
        delete_cascade(&self.ctx, &*self.get(id)?)?;
        self.ctx.registry().object_instances().remove(id);
        Ok(())
    }
}

fn children(ctx: &Context, instance: &DataObjectInstance) -> Vec<Arc<DataElementInstance>> {
    instance
        .read(|b| b.element_instances.clone())
        .into_iter()
        .filter_map(|ei| ctx.registry().element_instances().find(ei))
        .collect()
}

pub(crate) fn archive(ctx: &Context, instance: &DataObjectInstance) -> Result<()> {
    let _guard = instance.lock();
    instance.ensure_state(
        &[InstanceState::Created, InstanceState::Initialized],
        "archive",
    )?;
    cascade::reversible(
        instance.kind(),
        instance.uuid(),
        CascadeDirection::Archive,
        &children(ctx, instance),
        |ei| ei.uuid(),
        |ei| element_instances::archive(ctx, ei),
        |ei| element_instances::unarchive(ctx, ei),
    )?;
    ctx.apply(instance, InstanceOp::Archive)?;
    Ok(())
}

pub(crate) fn unarchive(ctx: &Context, instance: &DataObjectInstance) -> Result<()> {
    let _guard = instance.lock();
    instance.ensure_state(&[InstanceState::Archived], "unarchive")?;
    cascade::reversible(
        instance.kind(),
        instance.uuid(),
        CascadeDirection::Unarchive,
        &children(ctx, instance),
        |ei| ei.uuid(),
        |ei| element_instances::unarchive(ctx, ei),
        |ei| element_instances::archive(ctx, ei),
    )?;
    ctx.apply(instance, InstanceOp::Unarchive)?;
    Ok(())
}

pub(crate) fn delete_cascade(ctx: &Context, instance: &DataObjectInstance) -> Result<()> {
    let _guard = instance.lock();
    instance.ensure_state(
        &[
            InstanceState::Created,
            InstanceState::Initialized,
            InstanceState::Archived,
        ],
        "delete",
    )?;
    let live: Vec<_> = children(ctx, instance)
        .into_iter()
        .filter(|ei| ei.state() != InstanceState::Deleted)
        .collect();
    cascade::run_to_completion(&live, |ei| element_instances::delete(ctx, ei))?;
    ctx.apply(instance, InstanceOp::Delete)?;

    let object = instance.read(|b| b.object);
    let id = instance.id();
    if let Some(object) = ctx.registry().objects().find(object) {
        object.update(|b| b.instances.retain(|i| *i != id));
        ctx.persist(&object)?;
    }
    info!(target: "choreo::cascade", id = %id, "Deleted data object instance");
    Ok(())
}
