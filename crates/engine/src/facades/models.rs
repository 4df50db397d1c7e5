//! DataModels: namespace-qualified schemas compiled into objects
//!
//! A model is INITIAL until compiled. Compilation creates its objects and
//! their elements directly in READY, bottom-up, and moves the model to
//! READY. From then on the objects and elements are protected against
//! structural edits; only whole-model deletion removes them.

use crate::bodies::{DataElement, DataElementBody, DataModel, DataModelBody, DataObject, DataObjectBody};
use crate::cascade;
use crate::context::{Context, MODEL_SOURCE_COLLECTION};
use crate::facades::objects;
use crate::registry::ListFilter;
use choreo_core::{
    CascadeDirection, CompilationIssue, DataDependencyGraphId, DataElementId, DataModelId,
    DataObjectId, Error, LifecycleState, ModelOp, ModelState, ObjectTree, Result,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// DataModel operations
///
/// # Example
///
/// ```rust
/// use choreo_core::ModelState;
/// use choreo_engine::{Context, DataModels};
///
/// let ctx = Context::in_memory().unwrap();
/// let models = DataModels::new(ctx);
///
/// let model = models.create("hahnml", "urn:shop", "orders").unwrap();
/// let source = br#"{
///     "namespace": "urn:shop",
///     "name": "orders",
///     "objects": [
///         { "name": "invoice", "elements": [ { "name": "total", "type": "number" } ] }
///     ]
/// }"#;
/// let warnings = models.compile(model.id(), source).unwrap();
/// assert!(warnings.is_empty());
/// assert_eq!(model.state(), ModelState::Ready);
/// assert_eq!(models.objects(model.id()).unwrap().len(), 1);
/// ```
#[derive(Clone)]
pub struct DataModels {
    ctx: Arc<Context>,
}

impl DataModels {
    /// Create new DataModels facade
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Create an empty model in INITIAL
    pub fn create(&self, entity_name: &str, namespace: &str, name: &str) -> Result<Arc<DataModel>> {
        if name.trim().is_empty() {
            return Err(Error::invalid_input("model name must not be empty"));
        }
        let model = create_entity(&self.ctx, entity_name, namespace, name, None)?;
        info!(target: "choreo::registry", id = %model.id(), namespace, name, "Created data model");
        Ok(model)
    }

    /// Look up a model
    pub fn get(&self, id: DataModelId) -> Result<Arc<DataModel>> {
        self.ctx.registry().models().get(id)
    }

    /// Models matching `filter`
    pub fn list_where(&self, filter: &ListFilter) -> Vec<Arc<DataModel>> {
        self.ctx.registry().models().list_where(filter)
    }

    /// Objects in insertion order
    pub fn objects(&self, id: DataModelId) -> Result<Vec<Arc<DataObject>>> {
        Ok(object_children(&self.ctx, &*self.get(id)?))
    }

    /// Store the source document and compile it
    ///
    /// The source is kept in the persistence provider even when compilation
    /// fails, so it can be fetched with [`source`](Self::source) and fixed.
    pub fn set_source(&self, id: DataModelId, source: &[u8]) -> Result<Vec<CompilationIssue>> {
        let model = self.get(id)?;
        let _guard = model.lock();
        model.ensure_state(&[ModelState::Initial], "set_source")?;
        self.ctx
            .blobs()
            .store(MODEL_SOURCE_COLLECTION, model.uuid(), source)?;
        compile_locked(&self.ctx, &model, source)
    }

    /// Stored source document
    pub fn source(&self, id: DataModelId) -> Result<Vec<u8>> {
        let model = self.get(id)?;
        self.ctx.blobs().load(MODEL_SOURCE_COLLECTION, model.uuid())
    }

    /// Compile a source document into this model's objects
    ///
    /// Returns the compiler's warnings.
    ///
    /// # Errors
    /// - `LifecycleViolation` unless the model is INITIAL
    /// - `IllegalModification` if the model already has objects
    /// - `CompilationFailed` with every issue if any issue is an error;
    ///   the model stays INITIAL and nothing is created
    pub fn compile(&self, id: DataModelId, source: &[u8]) -> Result<Vec<CompilationIssue>> {
        let model = self.get(id)?;
        let _guard = model.lock();
        compile_locked(&self.ctx, &model, source)
    }

    /// Archive the model and its objects
    pub fn archive(&self, id: DataModelId) -> Result<()> {
        archive(&self.ctx, &*self.get(id)?)
    }

    /// Unarchive the model and its objects
    pub fn unarchive(&self, id: DataModelId) -> Result<()> {
        unarchive(&self.ctx, &*self.get(id)?)
    }

    /// Delete the model with all its objects, elements and instances
    ///
    /// # Errors
    /// - `IllegalModification` for a model compiled from a graph; delete
    ///   the graph instead
    /// - `DeletionFailed` if the cascade failed; the model is then INITIAL
    pub fn delete(&self, id: DataModelId) -> Result<()> {
        let model = self.get(id)?;
        if let Some(graph) = model.read(|b| b.graph) {
            if self.ctx.registry().graphs().has(graph) {
                return Err(Error::illegal_modification(
                    model.kind(),
                    model.uuid(),
                    format!("delete a model owned by data dependency graph {}", graph),
                ));
            }
        }
        delete_cascade(&self.ctx, &model)?;
        self.ctx.registry().models().remove(id);
        Ok(())
    }
}

pub(crate) fn create_entity(
    ctx: &Context,
    entity_name: &str,
    namespace: &str,
    name: &str,
    graph: Option<DataDependencyGraphId>,
) -> Result<Arc<DataModel>> {
    let model = Arc::new(DataModel::new(
        DataModelId::new(),
        DataModelBody {
            entity_name: entity_name.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            graph,
            objects: Vec::new(),
        },
    ));
    ctx.admit(ctx.registry().models(), Arc::clone(&model))?;
    Ok(model)
}

/// Registered, not yet deleted objects in insertion order
pub(crate) fn object_children(ctx: &Context, model: &DataModel) -> Vec<Arc<DataObject>> {
    model
        .read(|b| b.objects.clone())
        .into_iter()
        .filter_map(|o| ctx.registry().objects().find(o))
        .filter(|o| !o.state().is_terminal())
        .collect()
}

fn compile_locked(ctx: &Context, model: &DataModel, source: &[u8]) -> Result<Vec<CompilationIssue>> {
    model.ensure_state(&[ModelState::Initial], "compile")?;
    if model.read(|b| !b.objects.is_empty()) {
        return Err(Error::illegal_modification(
            model.kind(),
            model.uuid(),
            "compile a model that already has objects",
        ));
    }

    let (entity_name, namespace, name) =
        model.read(|b| (b.entity_name.clone(), b.namespace.clone(), b.name.clone()));
    let output = ctx.compiler().compile(model.uuid(), &entity_name, source)?;
    if output.has_errors() {
        warn!(
            target: "choreo::compile",
            id = %model.id(),
            issues = output.issues.len(),
            "Model compilation failed"
        );
        return Err(Error::CompilationFailed {
            kind: model.kind(),
            id: model.uuid(),
            issues: output.issues,
        });
    }
    let tree = match output.model {
        Some(tree) => tree,
        None => {
            return Err(Error::CompilationFailed {
                kind: model.kind(),
                id: model.uuid(),
                issues: output.issues,
            })
        }
    };
    if tree.namespace != namespace || tree.name != name {
        debug!(
            target: "choreo::compile",
            id = %model.id(),
            compiled = %format!("{}:{}", tree.namespace, tree.name),
            kept = %format!("{}:{}", namespace, name),
            "Compiled name differs; keeping the model's own"
        );
    }

    materialize(ctx, model, &tree.objects)?;
    info!(
        target: "choreo::compile",
        id = %model.id(),
        objects = tree.objects.len(),
        "Compiled data model"
    );
    Ok(output.issues)
}

/// Create READY objects and elements for `trees` and make the model READY
///
/// Callers hold the model's operation lock. On failure everything built so
/// far is discarded and the model is INITIAL without objects.
pub(crate) fn materialize(ctx: &Context, model: &DataModel, trees: &[ObjectTree]) -> Result<()> {
    build(ctx, model, trees).map_err(|e| {
        warn!(
            target: "choreo::compile",
            id = %model.id(),
            error = %e,
            "Discarding partially built data model"
        );
        discard_built(ctx, model);
        e
    })
}

/// Evict the objects and elements listed under `model` and reset it
///
/// Callers hold the model's operation lock.
pub(crate) fn discard_built(ctx: &Context, model: &DataModel) {
    let registry = ctx.registry();
    for object_id in model.update(|b| std::mem::take(&mut b.objects)) {
        if let Some(object) = registry.objects().find(object_id) {
            for element_id in object.read(|b| b.elements.clone()) {
                ctx.discard(registry.elements(), element_id);
            }
        }
        ctx.discard(registry.objects(), object_id);
    }
    if model.state() != ModelState::Initial {
        if let Err(e) = ctx.apply(model, ModelOp::Reset) {
            warn!(target: "choreo::compile", id = %model.id(), error = %e, "Reset of data model failed");
        }
    } else if let Err(e) = ctx.persist(model) {
        warn!(target: "choreo::compile", id = %model.id(), error = %e, "Failed to store emptied data model");
    }
}

fn build(ctx: &Context, model: &DataModel, trees: &[ObjectTree]) -> Result<()> {
    let entity_name = model.read(|b| b.entity_name.clone());
    let mut ready_objects = 0;

    for tree in trees {
        let object = Arc::new(DataObject::new(
            DataObjectId::new(),
            DataObjectBody {
                entity_name: entity_name.clone(),
                name: tree.name.clone(),
                data_model: Some(model.id()),
                elements: Vec::new(),
                instances: Vec::new(),
            },
        ));
        ctx.admit(ctx.registry().objects(), Arc::clone(&object))?;
        model.update(|b| b.objects.push(object.id()));

        let _object_guard = object.lock();
        for element_tree in &tree.elements {
            let element = Arc::new(DataElement::new(
                DataElementId::new(),
                DataElementBody {
                    entity_name: entity_name.clone(),
                    name: element_tree.name.clone(),
                    value_type: element_tree.value_type.clone(),
                    content_type: element_tree.content_type.clone(),
                    is_collection: element_tree.is_collection,
                    object: object.id(),
                    instances: Vec::new(),
                },
            ));
            ctx.admit(ctx.registry().elements(), Arc::clone(&element))?;
            object.update(|b| b.elements.push(element.id()));
            let _element_guard = element.lock();
            ctx.apply(&element, ModelOp::Ready)?;
        }

        if tree.elements.is_empty() {
            ctx.persist(&object)?;
        } else {
            ctx.apply(&object, ModelOp::Ready)?;
            ready_objects += 1;
        }
    }

    if ready_objects > 0 {
        ctx.apply(model, ModelOp::Ready)?;
    } else {
        ctx.persist(model)?;
    }
    Ok(())
}

pub(crate) fn archive(ctx: &Context, model: &DataModel) -> Result<()> {
    let _guard = model.lock();
    model.ensure_state(&[ModelState::Ready], "archive")?;
    cascade::reversible(
        model.kind(),
        model.uuid(),
        CascadeDirection::Archive,
        &object_children(ctx, model),
        |o| o.uuid(),
        |o| objects::archive(ctx, o),
        |o| objects::unarchive(ctx, o),
    )?;
    ctx.apply(model, ModelOp::Archive)?;
    Ok(())
}

pub(crate) fn unarchive(ctx: &Context, model: &DataModel) -> Result<()> {
    let _guard = model.lock();
    model.ensure_state(&[ModelState::Archived], "unarchive")?;
    cascade::reversible(
        model.kind(),
        model.uuid(),
        CascadeDirection::Unarchive,
        &object_children(ctx, model),
        |o| o.uuid(),
        |o| objects::unarchive(ctx, o),
        |o| objects::archive(ctx, o),
    )?;
    ctx.apply(model, ModelOp::Unarchive)?;
    Ok(())
}

/// Delete every object, then the model and its stored source
pub(crate) fn delete_cascade(ctx: &Context, model: &DataModel) -> Result<()> {
    let _guard = model.lock();
    model.ensure_state(
        &[ModelState::Initial, ModelState::Ready, ModelState::Archived],
        "delete",
    )?;

    let children = model.read(|b| b.objects.clone());
    let result = cascade::run_to_completion(&children, |id| {
        if let Some(object) = ctx.registry().objects().find(*id) {
            if object.state() != ModelState::Deleted {
                objects::delete_cascade(ctx, &object)?;
            }
        }
        model.update(|b| b.objects.retain(|o| o != id));
        Ok(())
    })
    .and_then(|()| ctx.blobs().remove(MODEL_SOURCE_COLLECTION, model.uuid()))
    .and_then(|()| ctx.apply(model, ModelOp::Delete).map(drop));
    if let Err(cause) = result {
        let registry = ctx.registry();
        model.update(|b| {
            b.objects.retain(|o| {
                registry
                    .objects()
                    .find(*o)
                    .is_some_and(|obj| !obj.state().is_terminal())
            })
        });
        return Err(cascade::deletion_failed(ctx, model, cause));
    }
    info!(target: "choreo::cascade", id = %model.id(), "Deleted data model");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChoreoConfig;
    use crate::context::Collaborators;
    use crate::facades::{DataDependencyGraphs, DataElements, DataObjects};
    use choreo_core::{EntityKind, PersistenceProvider};
    use choreo_storage::MemoryBlobStore;
    use uuid::Uuid;

    /// Blob store that keeps everything it is given
    struct StuckBlobs(MemoryBlobStore);

    impl PersistenceProvider for StuckBlobs {
        fn store(&self, collection: &str, id: Uuid, bytes: &[u8]) -> Result<()> {
            self.0.store(collection, id, bytes)
        }

        fn load(&self, collection: &str, id: Uuid) -> Result<Vec<u8>> {
            self.0.load(collection, id)
        }

        fn remove(&self, _: &str, _: Uuid) -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }
    }

    const ORDERS: &[u8] = br#"{
        "namespace": "urn:shop",
        "name": "orders",
        "objects": [
            { "name": "invoice", "elements": [
                { "name": "total", "type": "number" },
                { "name": "lines", "type": "json", "collection": true }
            ] },
            { "name": "receipt", "elements": [ { "name": "paid", "type": "boolean" } ] }
        ]
    }"#;

    #[test]
    fn test_compile_builds_ready_tree() {
        let ctx = Context::in_memory().unwrap();
        let models = DataModels::new(Arc::clone(&ctx));
        let model = models.create("hahnml", "urn:shop", "orders").unwrap();

        let warnings = models.compile(model.id(), ORDERS).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(model.state(), ModelState::Ready);

        let objects = models.objects(model.id()).unwrap();
        let names: Vec<_> = objects.iter().map(|o| o.read(|b| b.name.clone())).collect();
        assert_eq!(names, vec!["invoice", "receipt"]);
        for object in &objects {
            assert_eq!(object.state(), ModelState::Ready);
            assert!(object.read(|b| b.is_model_owned()));
        }
        assert_eq!(ctx.registry().elements().len(), 3);
    }

    #[test]
    fn test_compile_failure_creates_nothing() {
        let ctx = Context::in_memory().unwrap();
        let models = DataModels::new(Arc::clone(&ctx));
        let model = models.create("hahnml", "urn:shop", "orders").unwrap();

        let err = models.compile(model.id(), b"{ not json").unwrap_err();
        match err {
            Error::CompilationFailed { issues, .. } => {
                assert!(!issues.is_empty());
                assert!(issues.iter().any(|i| i.is_error()));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(model.state(), ModelState::Initial);
        assert!(ctx.registry().objects().is_empty());
    }

    #[test]
    fn test_second_compile_is_rejected() {
        let ctx = Context::in_memory().unwrap();
        let models = DataModels::new(ctx);
        let model = models.create("hahnml", "urn:shop", "orders").unwrap();
        models.compile(model.id(), ORDERS).unwrap();
        let err = models.compile(model.id(), ORDERS).unwrap_err();
        assert!(err.is_lifecycle_violation());
    }

    #[test]
    fn test_set_source_keeps_document() {
        let ctx = Context::in_memory().unwrap();
        let models = DataModels::new(ctx);
        let model = models.create("hahnml", "urn:shop", "orders").unwrap();
        assert!(models.set_source(model.id(), b"[]").is_err());
        assert_eq!(models.source(model.id()).unwrap(), b"[]".to_vec());
        assert_eq!(model.state(), ModelState::Initial);
    }

    #[test]
    fn test_model_owned_entities_are_protected() {
        let ctx = Context::in_memory().unwrap();
        let models = DataModels::new(Arc::clone(&ctx));
        let objects = DataObjects::new(Arc::clone(&ctx));
        let elements = DataElements::new(Arc::clone(&ctx));
        let model = models.create("hahnml", "urn:shop", "orders").unwrap();
        models.compile(model.id(), ORDERS).unwrap();

        let invoice = &models.objects(model.id()).unwrap()[0];
        let total = ctx
            .registry()
            .elements()
            .get(invoice.read(|b| b.elements[0]))
            .unwrap();

        assert!(matches!(
            objects.rename(invoice.id(), "bill"),
            Err(Error::IllegalModification { .. })
        ));
        assert!(matches!(
            objects.delete(invoice.id()),
            Err(Error::IllegalModification { .. })
        ));
        assert!(matches!(
            elements.rename(total.id(), "sum"),
            Err(Error::IllegalModification { .. })
        ));
        assert!(matches!(
            elements.delete(total.id()),
            Err(Error::IllegalModification { .. })
        ));
        assert_eq!(total.read(|b| b.name.clone()), "total");
        assert_eq!(total.state(), ModelState::Ready);
    }

    #[test]
    fn test_delete_removes_whole_tree() {
        let ctx = Context::in_memory().unwrap();
        let models = DataModels::new(Arc::clone(&ctx));
        let model = models.create("hahnml", "urn:shop", "orders").unwrap();
        models.compile(model.id(), ORDERS).unwrap();

        models.delete(model.id()).unwrap();
        ctx.flush_events();
        assert_eq!(model.state(), ModelState::Deleted);
        assert!(ctx.registry().models().is_empty());
        assert!(ctx.registry().objects().is_empty());
        assert!(ctx.registry().elements().is_empty());
    }

    #[test]
    fn test_graph_owned_model_is_deleted_through_its_graph() {
        let ctx = Context::in_memory().unwrap();
        let graphs = DataDependencyGraphs::new(Arc::clone(&ctx));
        let models = DataModels::new(Arc::clone(&ctx));
        let graph = graphs.create("hahnml", "shop", "urn:shop").unwrap();
        graphs.set_source(graph.id(), ORDERS).unwrap();
        let model = graphs.data_model(graph.id()).unwrap().unwrap();

        let err = models.delete(model.id()).unwrap_err();
        assert!(matches!(err, Error::IllegalModification { .. }));
        assert_eq!(model.state(), ModelState::Ready);
        assert_eq!(graph.state(), ModelState::Ready);
        assert_eq!(models.objects(model.id()).unwrap().len(), 2);

        graphs.delete(graph.id()).unwrap();
        assert_eq!(model.state(), ModelState::Deleted);
    }

    #[test]
    fn test_failed_source_removal_keeps_model() {
        let collaborators = Collaborators {
            blobs: Arc::new(StuckBlobs(MemoryBlobStore::new())),
            ..Collaborators::in_memory()
        };
        let ctx = Context::open(ChoreoConfig::default(), collaborators).unwrap();
        let models = DataModels::new(Arc::clone(&ctx));
        let model = models.create("hahnml", "urn:shop", "orders").unwrap();
        models.set_source(model.id(), ORDERS).unwrap();

        match models.delete(model.id()).unwrap_err() {
            Error::DeletionFailed { kind, source, .. } => {
                assert_eq!(kind, EntityKind::DataModel);
                assert!(matches!(*source, Error::Io(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(model.state(), ModelState::Initial);
        assert!(models.get(model.id()).is_ok());
        assert_eq!(models.source(model.id()).unwrap(), ORDERS.to_vec());
    }
}
