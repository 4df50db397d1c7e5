//! Context: the explicitly constructed engine instance
//!
//! A [`Context`] owns the registry, the event bus and its worker, and the
//! external collaborators (blob store, entity store, schema compiler). The
//! per-kind facades hold an `Arc<Context>` and nothing else.
//!
//! ## Opening
//!
//! - [`Context::open`]: explicit config and collaborators
//! - [`Context::open_dir`]: reads `choreo.toml` in a directory and uses
//!   file-backed stores under it
//! - [`Context::in_memory`]: defaults with in-memory stores
//!
//! Every open rebuilds the registry from the entity store.
//!
//! ## Teardown
//!
//! [`Context::shutdown`] drains pending events and joins the worker. It
//! also runs on drop.

use crate::config::{ChoreoConfig, CONFIG_FILE_NAME};
use crate::entity::{Entity, EntityBody};
use crate::events::EventBus;
use crate::registry::{Index, Registry};
use choreo_compiler::JsonSchemaCompiler;
use choreo_core::{
    EntityId, EntityStore, LifecycleEvent, LifecycleListener, LifecycleState, PersistenceProvider,
    Result, SchemaCompiler, Transition,
};
use choreo_storage::{FileBlobStore, FileEntityStore, MemoryBlobStore, MemoryEntityStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Blob collection holding graph source documents
pub const GRAPH_SOURCE_COLLECTION: &str = "ddg_sources";
/// Blob collection holding model source documents
pub const MODEL_SOURCE_COLLECTION: &str = "model_sources";
/// Blob collection holding DataValue payloads
pub const VALUE_COLLECTION: &str = "data_values";

/// External collaborators of a context
#[derive(Clone)]
pub struct Collaborators {
    /// Byte-blob persistence
    pub blobs: Arc<dyn PersistenceProvider>,
    /// Entity record persistence
    pub store: Arc<dyn EntityStore>,
    /// Schema compiler
    pub compiler: Arc<dyn SchemaCompiler>,
}

impl Collaborators {
    /// In-memory stores and the JSON compiler
    pub fn in_memory() -> Self {
        Self {
            blobs: Arc::new(MemoryBlobStore::new()),
            store: Arc::new(MemoryEntityStore::new()),
            compiler: Arc::new(JsonSchemaCompiler::new()),
        }
    }

    /// File-backed stores under `dir` and the JSON compiler
    pub fn on_disk(dir: &Path) -> Result<Self> {
        Ok(Self {
            blobs: Arc::new(FileBlobStore::open(dir.join("blobs"))?),
            store: Arc::new(FileEntityStore::open(dir.join("entities"))?),
            compiler: Arc::new(JsonSchemaCompiler::new()),
        })
    }

    /// Collaborators selected by `config.data_dir`
    pub fn for_config(config: &ChoreoConfig) -> Result<Self> {
        match &config.data_dir {
            Some(dir) => Self::on_disk(dir),
            None => Ok(Self::in_memory()),
        }
    }

    /// Replace the compiler
    pub fn with_compiler(mut self, compiler: Arc<dyn SchemaCompiler>) -> Self {
        self.compiler = compiler;
        self
    }
}

/// Engine instance
pub struct Context {
    config: ChoreoConfig,
    registry: Arc<Registry>,
    bus: EventBus,
    blobs: Arc<dyn PersistenceProvider>,
    store: Arc<dyn EntityStore>,
    compiler: Arc<dyn SchemaCompiler>,
}

impl Context {
    /// Open a context with explicit config and collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid, the entity store cannot
    /// be read, or the event worker cannot be started.
    pub fn open(config: ChoreoConfig, collaborators: Collaborators) -> Result<Arc<Self>> {
        config.validate()?;

        let registry = Arc::new(Registry::new());
        let loaded = rehydrate(collaborators.store.as_ref(), &registry)?;
        let bus = EventBus::start(Arc::clone(&registry), config.event_channel_capacity)?;

        info!(
            target: "choreo::registry",
            entities = loaded,
            persist = config.persist_entities,
            "Context opened"
        );

        Ok(Arc::new(Self {
            config,
            registry,
            bus,
            blobs: collaborators.blobs,
            store: collaborators.store,
            compiler: collaborators.compiler,
        }))
    }

    /// Open a context on a data directory.
    ///
    /// Reads `choreo.toml` from `path`, writing the default file first if
    /// missing, and keeps blobs and entity records under `path`.
    pub fn open_dir<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let mut config = ChoreoConfig::load(&data_dir.join(CONFIG_FILE_NAME))?;
        config.data_dir = Some(data_dir);
        let collaborators = Collaborators::for_config(&config)?;
        Self::open(config, collaborators)
    }

    /// Open a context with default config and in-memory stores
    pub fn in_memory() -> Result<Arc<Self>> {
        Self::open(ChoreoConfig::default(), Collaborators::in_memory())
    }

    /// Active configuration
    pub fn config(&self) -> &ChoreoConfig {
        &self.config
    }

    /// Entity registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Lifecycle event bus
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe a listener to every lifecycle event
    pub fn subscribe(&self, listener: Arc<dyn LifecycleListener>) {
        self.bus.subscribe(listener);
    }

    /// Wait until every event published so far has been dispatched
    ///
    /// Entities deleted by a cascade leave the registry once their event is
    /// dispatched; call this before asserting on registry contents.
    pub fn flush_events(&self) {
        self.bus.flush();
    }

    /// Drain pending events and stop the worker; idempotent
    pub fn shutdown(&self) {
        if self.bus.is_running() {
            self.bus.shutdown();
            info!(target: "choreo::registry", "Context shut down");
        }
    }

    pub(crate) fn blobs(&self) -> &dyn PersistenceProvider {
        self.blobs.as_ref()
    }

    pub(crate) fn compiler(&self) -> &dyn SchemaCompiler {
        self.compiler.as_ref()
    }

    /// Run one guarded transition, then persist and publish it.
    ///
    /// Callers hold the entity's operation lock. A deletion removes the
    /// stored record before the state changes, so a failing store leaves
    /// the entity as it was.
    pub(crate) fn apply<B: EntityBody>(
        &self,
        entity: &Entity<B>,
        op: <B::State as LifecycleState>::Op,
    ) -> Result<Transition<B::State>> {
        let deleting = entity.target(op).is_some_and(|to| to.is_terminal());
        if deleting && self.config.persist_entities {
            self.store.delete(entity.kind(), entity.uuid())?;
        }

        let transition = match entity.transition(op, self.config.transition_retries) {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    target: "choreo::lifecycle",
                    kind = %entity.kind(),
                    id = %entity.uuid(),
                    operation = %op,
                    error = %e,
                    "Transition rejected"
                );
                if deleting {
                    if let Err(restore) = self.persist(entity) {
                        warn!(
                            target: "choreo::lifecycle",
                            id = %entity.uuid(),
                            error = %restore,
                            "Failed to restore record after a rejected deletion"
                        );
                    }
                }
                return Err(e);
            }
        };

        debug!(
            target: "choreo::lifecycle",
            kind = %entity.kind(),
            id = %entity.uuid(),
            from = %transition.from,
            to = %transition.to,
            version = transition.version,
            "Transition"
        );

        let persisted = if transition.to.is_terminal() {
            Ok(())
        } else {
            self.persist(entity)
        };
        self.bus.publish(LifecycleEvent {
            kind: entity.kind(),
            id: entity.uuid(),
            old_state: transition.from.into(),
            new_state: transition.to.into(),
            version: transition.version,
        });
        persisted?;
        Ok(transition)
    }

    /// Write the entity's current record to the entity store
    ///
    /// Deleted entities have no record; persisting one does nothing.
    pub(crate) fn persist<B: EntityBody>(&self, entity: &Entity<B>) -> Result<()> {
        if self.config.persist_entities && !entity.state().is_terminal() {
            self.store.save(&entity.to_record()?)?;
        }
        Ok(())
    }

    /// Evict an entity that never settled and drop its stored record
    pub(crate) fn discard<B: EntityBody>(&self, index: &Index<B>, id: B::Id) {
        index.remove(id);
        if self.config.persist_entities {
            if let Err(e) = self.store.delete(B::Id::KIND, id.as_uuid()) {
                warn!(
                    target: "choreo::registry",
                    kind = %B::Id::KIND,
                    id = %id.as_uuid(),
                    error = %e,
                    "Failed to drop record of a discarded entity"
                );
            }
        }
    }

    /// Register a new entity and persist it
    pub(crate) fn admit<B: EntityBody>(
        &self,
        index: &Index<B>,
        entity: Arc<Entity<B>>,
    ) -> Result<()> {
        self.persist(&entity)?;
        index.register(entity)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn rehydrate(store: &dyn EntityStore, registry: &Registry) -> Result<usize> {
    Ok(rehydrate_index(store, registry.graphs())?
        + rehydrate_index(store, registry.models())?
        + rehydrate_index(store, registry.objects())?
        + rehydrate_index(store, registry.elements())?
        + rehydrate_index(store, registry.object_instances())?
        + rehydrate_index(store, registry.element_instances())?
        + rehydrate_index(store, registry.values())?)
}

fn rehydrate_index<B: EntityBody>(store: &dyn EntityStore, index: &Index<B>) -> Result<usize> {
    let mut loaded = 0;
    for record in store.load_all(B::Id::KIND)? {
        let entity = Entity::<B>::from_record(record)?;
        if entity.state().is_terminal() {
            continue;
        }
        index.register(Arc::new(entity))?;
        loaded += 1;
    }
    if loaded > 0 {
        debug!(target: "choreo::registry", kind = %B::Id::KIND, loaded, "Rehydrated index");
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::{DataValue, DataValueBody};
    use chrono::Utc;
    use choreo_core::{DataValueId, EntityKind, InstanceOp, InstanceState};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collector {
        events: Mutex<Vec<LifecycleEvent>>,
    }

    impl LifecycleListener for Collector {
        fn on_event(&self, event: &LifecycleEvent) {
            self.events.lock().push(event.clone());
        }
    }

    fn value() -> Arc<DataValue> {
        let now = Utc::now();
        Arc::new(DataValue::new(
            DataValueId::new(),
            DataValueBody {
                name: "v".into(),
                owner: "svc".into(),
                created: now,
                last_modified: now,
                size: 0,
                value_type: "string".into(),
                content_type: "text/plain".into(),
                associations: Vec::new(),
            },
        ))
    }

    #[test]
    fn test_apply_publishes_and_persists() {
        let store = Arc::new(MemoryEntityStore::new());
        let collaborators = Collaborators {
            store: store.clone(),
            ..Collaborators::in_memory()
        };
        let ctx = Context::open(ChoreoConfig::default(), collaborators).unwrap();
        let collector = Arc::new(Collector::default());
        ctx.subscribe(collector.clone());

        let v = value();
        ctx.admit(ctx.registry().values(), Arc::clone(&v)).unwrap();
        assert_eq!(store.count(EntityKind::DataValue), 1);

        {
            let _guard = v.lock();
            ctx.apply(&v, InstanceOp::Initialize).unwrap();
            ctx.apply(&v, InstanceOp::Delete).unwrap();
        }
        ctx.flush_events();

        let events = collector.events.lock().clone();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].new_state, InstanceState::Initialized.into());
        assert!(events[1].is_deletion());
        assert_eq!(events[1].version, 3);

        // Deletion removed the record and, via the worker, the index entry
        assert_eq!(store.count(EntityKind::DataValue), 0);
        assert!(!ctx.registry().values().has(v.id()));
    }

    #[test]
    fn test_rejected_transition_publishes_nothing() {
        let ctx = Context::in_memory().unwrap();
        let collector = Arc::new(Collector::default());
        ctx.subscribe(collector.clone());

        let v = value();
        ctx.admit(ctx.registry().values(), Arc::clone(&v)).unwrap();
        let err = ctx.apply(&v, InstanceOp::Unarchive).unwrap_err();
        assert!(err.is_lifecycle_violation());
        ctx.flush_events();
        assert!(collector.events.lock().is_empty());
        assert_eq!(v.version(), 1);
    }

    #[test]
    fn test_reopen_rehydrates() {
        let store = Arc::new(MemoryEntityStore::new());
        let v = value();
        {
            let ctx = Context::open(
                ChoreoConfig::default(),
                Collaborators {
                    store: store.clone(),
                    ..Collaborators::in_memory()
                },
            )
            .unwrap();
            ctx.admit(ctx.registry().values(), Arc::clone(&v)).unwrap();
            let _guard = v.lock();
            ctx.apply(&v, InstanceOp::Initialize).unwrap();
        }

        let ctx = Context::open(
            ChoreoConfig::default(),
            Collaborators {
                store,
                ..Collaborators::in_memory()
            },
        )
        .unwrap();
        let restored = ctx.registry().values().get(v.id()).unwrap();
        assert_eq!(restored.state(), InstanceState::Initialized);
        assert_eq!(restored.version(), 2);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let ctx = Context::in_memory().unwrap();
        ctx.shutdown();
        ctx.shutdown();
        assert!(!ctx.bus().is_running());
    }

    #[test]
    fn test_open_dir_writes_config() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::open_dir(dir.path()).unwrap();
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
        assert_eq!(ctx.config().data_dir.as_deref(), Some(dir.path()));
    }
}
