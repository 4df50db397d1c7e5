//! Entity registry
//!
//! One [`Index`] per entity kind, identifier to entity. The registry only
//! stores and evicts: it never runs an entity's cascade itself. Entities
//! deleted as a side effect of a cascade are evicted by the event worker
//! (see [`crate::events`]) when their deletion event arrives.

use crate::bodies::{
    DataDependencyGraphBody, DataElementBody, DataElementInstanceBody, DataModelBody,
    DataObjectBody, DataObjectInstanceBody, DataValueBody,
};
use crate::entity::{Entity, EntityBody};
use choreo_core::{EntityId, EntityKind, EntityState, Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Filter for [`Index::list_where`]
///
/// Unset fields match everything.
///
/// # Example
///
/// ```rust
/// use choreo_core::ModelState;
/// use choreo_engine::ListFilter;
///
/// let filter = ListFilter::new().state(ModelState::Ready).entity_name("hahnml");
/// assert!(filter.name.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Lifecycle state
    pub state: Option<EntityState>,
    /// Name
    pub name: Option<String>,
    /// Entity name
    pub entity_name: Option<String>,
    /// Owning entity
    pub parent: Option<Uuid>,
}

impl ListFilter {
    /// Filter matching everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a lifecycle state
    pub fn state(mut self, state: impl Into<EntityState>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Require a name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Require an entity name
    pub fn entity_name(mut self, entity_name: impl Into<String>) -> Self {
        self.entity_name = Some(entity_name.into());
        self
    }

    /// Require an owning entity
    pub fn parent(mut self, parent: impl EntityId) -> Self {
        self.parent = Some(parent.as_uuid());
        self
    }

    fn matches<B: EntityBody>(&self, entity: &Entity<B>) -> bool {
        if let Some(state) = self.state {
            if Into::<EntityState>::into(entity.state()) != state {
                return false;
            }
        }
        entity.read(|body| {
            self.name.as_deref().map_or(true, |n| body.name() == Some(n))
                && self
                    .entity_name
                    .as_deref()
                    .map_or(true, |n| body.entity_name() == Some(n))
                && self.parent.map_or(true, |p| body.parent() == Some(p))
        })
    }
}

/// Index of one entity kind
pub struct Index<B: EntityBody> {
    map: DashMap<B::Id, Arc<Entity<B>>>,
}

impl<B: EntityBody> Index<B> {
    fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    /// Insert an entity
    ///
    /// # Errors
    /// `AlreadyRegistered` if the identifier is taken.
    pub fn register(&self, entity: Arc<Entity<B>>) -> Result<()> {
        match self.map.entry(entity.id()) {
            Entry::Occupied(_) => Err(Error::AlreadyRegistered {
                kind: B::Id::KIND,
                id: entity.uuid(),
            }),
            Entry::Vacant(slot) => {
                debug!(target: "choreo::registry", kind = %B::Id::KIND, id = %entity.id(), "Registered");
                slot.insert(entity);
                Ok(())
            }
        }
    }

    /// Look up an entity
    ///
    /// # Errors
    /// `NotFound` if the identifier is not indexed.
    pub fn get(&self, id: B::Id) -> Result<Arc<Entity<B>>> {
        self.find(id)
            .ok_or_else(|| Error::not_found(B::Id::KIND.as_str(), id))
    }

    /// Look up an entity, `None` if absent
    pub fn find(&self, id: B::Id) -> Option<Arc<Entity<B>>> {
        self.map.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Check if an identifier is indexed
    pub fn has(&self, id: B::Id) -> bool {
        self.map.contains_key(&id)
    }

    /// Evict an entity; does not run its delete cascade
    pub fn remove(&self, id: B::Id) -> Option<Arc<Entity<B>>> {
        self.map.remove(&id).map(|(_, e)| e)
    }

    /// Entities matching `filter`, in no particular order
    pub fn list_where(&self, filter: &ListFilter) -> Vec<Arc<Entity<B>>> {
        self.map
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Every indexed entity
    pub fn all(&self) -> Vec<Arc<Entity<B>>> {
        self.list_where(&ListFilter::default())
    }

    /// Number of indexed entities
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// All indices
pub struct Registry {
    graphs: Index<DataDependencyGraphBody>,
    models: Index<DataModelBody>,
    objects: Index<DataObjectBody>,
    elements: Index<DataElementBody>,
    object_instances: Index<DataObjectInstanceBody>,
    element_instances: Index<DataElementInstanceBody>,
    values: Index<DataValueBody>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            graphs: Index::new(),
            models: Index::new(),
            objects: Index::new(),
            elements: Index::new(),
            object_instances: Index::new(),
            element_instances: Index::new(),
            values: Index::new(),
        }
    }

    /// DataDependencyGraph index
    pub fn graphs(&self) -> &Index<DataDependencyGraphBody> {
        &self.graphs
    }

    /// DataModel index
    pub fn models(&self) -> &Index<DataModelBody> {
        &self.models
    }

    /// DataObject index
    pub fn objects(&self) -> &Index<DataObjectBody> {
        &self.objects
    }

    /// DataElement index
    pub fn elements(&self) -> &Index<DataElementBody> {
        &self.elements
    }

    /// DataObjectInstance index
    pub fn object_instances(&self) -> &Index<DataObjectInstanceBody> {
        &self.object_instances
    }

    /// DataElementInstance index
    pub fn element_instances(&self) -> &Index<DataElementInstanceBody> {
        &self.element_instances
    }

    /// DataValue index
    pub fn values(&self) -> &Index<DataValueBody> {
        &self.values
    }

    /// Check if an entity of any kind is indexed
    pub fn contains(&self, kind: EntityKind, id: Uuid) -> bool {
        match kind {
            EntityKind::DataDependencyGraph => self.graphs.has(EntityId::from_uuid(id)),
            EntityKind::DataModel => self.models.has(EntityId::from_uuid(id)),
            EntityKind::DataObject => self.objects.has(EntityId::from_uuid(id)),
            EntityKind::DataElement => self.elements.has(EntityId::from_uuid(id)),
            EntityKind::DataObjectInstance => self.object_instances.has(EntityId::from_uuid(id)),
            EntityKind::DataElementInstance => {
                self.element_instances.has(EntityId::from_uuid(id))
            }
            EntityKind::DataValue => self.values.has(EntityId::from_uuid(id)),
        }
    }

    /// Evict by kind and raw identifier; returns whether anything was removed
    pub fn evict(&self, kind: EntityKind, id: Uuid) -> bool {
        let removed = match kind {
            EntityKind::DataDependencyGraph => {
                self.graphs.remove(EntityId::from_uuid(id)).is_some()
            }
            EntityKind::DataModel => self.models.remove(EntityId::from_uuid(id)).is_some(),
            EntityKind::DataObject => self.objects.remove(EntityId::from_uuid(id)).is_some(),
            EntityKind::DataElement => self.elements.remove(EntityId::from_uuid(id)).is_some(),
            EntityKind::DataObjectInstance => self
                .object_instances
                .remove(EntityId::from_uuid(id))
                .is_some(),
            EntityKind::DataElementInstance => self
                .element_instances
                .remove(EntityId::from_uuid(id))
                .is_some(),
            EntityKind::DataValue => self.values.remove(EntityId::from_uuid(id)).is_some(),
        };
        if removed {
            info!(target: "choreo::registry", kind = %kind, id = %id, "Evicted");
        }
        removed
    }

    /// Number of indexed entities of one kind
    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::DataDependencyGraph => self.graphs.len(),
            EntityKind::DataModel => self.models.len(),
            EntityKind::DataObject => self.objects.len(),
            EntityKind::DataElement => self.elements.len(),
            EntityKind::DataObjectInstance => self.object_instances.len(),
            EntityKind::DataElementInstance => self.element_instances.len(),
            EntityKind::DataValue => self.values.len(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
