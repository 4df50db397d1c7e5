//! DataDependencyGraphs: source documents that compile into one DataModel
//!
//! A graph is INITIAL until its source compiles. Compilation creates the
//! model (with its objects and elements) and moves the graph to READY.
//! Archive, unarchive and delete cascade to the model.

use crate::bodies::{DataDependencyGraph, DataDependencyGraphBody, DataModel};
use crate::cascade;
use crate::context::{Context, GRAPH_SOURCE_COLLECTION};
use crate::facades::models;
use crate::registry::ListFilter;
use choreo_core::{
    CascadeDirection, CompilationIssue, DataDependencyGraphId, Error, ModelOp, ModelState, Result,
};
use std::sync::Arc;
use tracing::{info, warn};

/// DataDependencyGraph operations
#[derive(Clone)]
pub struct DataDependencyGraphs {
    ctx: Arc<Context>,
}

impl DataDependencyGraphs {
    /// Create new DataDependencyGraphs facade
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Create a graph in INITIAL
    pub fn create(
        &self,
        entity_name: &str,
        name: &str,
        target_namespace: &str,
    ) -> Result<Arc<DataDependencyGraph>> {
        if name.trim().is_empty() {
            return Err(Error::invalid_input("graph name must not be empty"));
        }
        let graph = Arc::new(DataDependencyGraph::new(
            DataDependencyGraphId::new(),
            DataDependencyGraphBody {
                entity_name: entity_name.to_string(),
                name: name.to_string(),
                target_namespace: target_namespace.to_string(),
                data_model: None,
            },
        ));
        self.ctx
            .admit(self.ctx.registry().graphs(), Arc::clone(&graph))?;
        info!(target: "choreo::registry", id = %graph.id(), name, "Created data dependency graph");
        Ok(graph)
    }

    /// Look up a graph
    pub fn get(&self, id: DataDependencyGraphId) -> Result<Arc<DataDependencyGraph>> {
        self.ctx.registry().graphs().get(id)
    }

    /// Graphs matching `filter`
    pub fn list_where(&self, filter: &ListFilter) -> Vec<Arc<DataDependencyGraph>> {
        self.ctx.registry().graphs().list_where(filter)
    }

    /// Model produced by compilation, if any
    pub fn data_model(&self, id: DataDependencyGraphId) -> Result<Option<Arc<DataModel>>> {
        Ok(model_of(&self.ctx, &*self.get(id)?))
    }

    /// Store the source document and compile it
    pub fn set_source(
        &self,
        id: DataDependencyGraphId,
        source: &[u8],
    ) -> Result<Vec<CompilationIssue>> {
        let graph = self.get(id)?;
        let _guard = graph.lock();
        graph.ensure_state(&[ModelState::Initial], "set_source")?;
        self.ctx
            .blobs()
            .store(GRAPH_SOURCE_COLLECTION, graph.uuid(), source)?;
        compile_locked(&self.ctx, &graph, source)
    }

    /// Stored source document
    pub fn source(&self, id: DataDependencyGraphId) -> Result<Vec<u8>> {
        let graph = self.get(id)?;
        self.ctx.blobs().load(GRAPH_SOURCE_COLLECTION, graph.uuid())
    }

    /// Compile a source document into a new DataModel
    ///
    /// Returns the compiler's warnings.
    ///
    /// # Errors
    /// - `LifecycleViolation` unless the graph is INITIAL
    /// - `IllegalModification` if the graph already has a model
    /// - `CompilationFailed` with every issue if any issue is an error
    pub fn compile(&self, id: DataDependencyGraphId, source: &[u8]) -> Result<Vec<CompilationIssue>> {
        let graph = self.get(id)?;
        let _guard = graph.lock();
        compile_locked(&self.ctx, &graph, source)
    }

    /// Archive the graph and its model
    pub fn archive(&self, id: DataDependencyGraphId) -> Result<()> {
        let graph = self.get(id)?;
        let _guard = graph.lock();
        graph.ensure_state(&[ModelState::Ready], "archive")?;
        let children: Vec<_> = model_of(&self.ctx, &graph).into_iter().collect();
        cascade::reversible(
            graph.kind(),
            graph.uuid(),
            CascadeDirection::Archive,
            &children,
            |m| m.uuid(),
            |m| models::archive(&self.ctx, m),
            |m| models::unarchive(&self.ctx, m),
        )?;
        self.ctx.apply(&graph, ModelOp::Archive)?;
        Ok(())
    }

    /// Unarchive the graph and its model
    pub fn unarchive(&self, id: DataDependencyGraphId) -> Result<()> {
        let graph = self.get(id)?;
        let _guard = graph.lock();
        graph.ensure_state(&[ModelState::Archived], "unarchive")?;
        let children: Vec<_> = model_of(&self.ctx, &graph).into_iter().collect();
        cascade::reversible(
            graph.kind(),
            graph.uuid(),
            CascadeDirection::Unarchive,
            &children,
            |m| m.uuid(),
            |m| models::unarchive(&self.ctx, m),
            |m| models::archive(&self.ctx, m),
        )?;
        self.ctx.apply(&graph, ModelOp::Unarchive)?;
        Ok(())
    }

    /// Delete the graph, its model and the stored source
    ///
    /// # Errors
    /// `DeletionFailed` if deleting the model failed; the graph is then
    /// INITIAL.
    pub fn delete(&self, id: DataDependencyGraphId) -> Result<()> {
        let graph = self.get(id)?;
        {
            let _guard = graph.lock();
            graph.ensure_state(
                &[ModelState::Initial, ModelState::Ready, ModelState::Archived],
                "delete",
            )?;
            let cascaded = match model_of(&self.ctx, &graph) {
                Some(model) if model.state() != ModelState::Deleted => {
                    models::delete_cascade(&self.ctx, &model)
                }
                _ => Ok(()),
            }
            .and_then(|()| {
                self.ctx
                    .blobs()
                    .remove(GRAPH_SOURCE_COLLECTION, graph.uuid())
            })
            .and_then(|()| self.ctx.apply(&graph, ModelOp::Delete).map(drop));
            if let Err(cause) = cascaded {
                return Err(cascade::deletion_failed(&self.ctx, &graph, cause));
            }
        }
        self.ctx.registry().graphs().remove(id);
        info!(target: "choreo::cascade", id = %id, "Deleted data dependency graph");
        Ok(())
    }
}

fn model_of(ctx: &Context, graph: &DataDependencyGraph) -> Option<Arc<DataModel>> {
    graph
        .read(|b| b.data_model)
        .and_then(|m| ctx.registry().models().find(m))
}

fn compile_locked(
    ctx: &Context,
    graph: &DataDependencyGraph,
    source: &[u8],
) -> Result<Vec<CompilationIssue>> {
    graph.ensure_state(&[ModelState::Initial], "compile")?;
    if graph.read(|b| b.data_model.is_some()) {
        return Err(Error::illegal_modification(
            graph.kind(),
            graph.uuid(),
            "compile a graph that already has a data model",
        ));
    }

    let entity_name = graph.read(|b| b.entity_name.clone());
    let output = ctx.compiler().compile(graph.uuid(), &entity_name, source)?;
    let tree = match output.model {
        Some(tree) if !output.issues.iter().any(CompilationIssue::is_error) => tree,
        _ => {
            warn!(
                target: "choreo::compile",
                id = %graph.id(),
                issues = output.issues.len(),
                "Graph compilation failed"
            );
            return Err(Error::CompilationFailed {
                kind: graph.kind(),
                id: graph.uuid(),
                issues: output.issues,
            });
        }
    };

    let target_namespace = graph.read(|b| b.target_namespace.clone());
    if !target_namespace.is_empty() && tree.namespace != target_namespace {
        warn!(
            target: "choreo::compile",
            id = %graph.id(),
            expected = %target_namespace,
            compiled = %tree.namespace,
            "Compiled model is outside the graph's target namespace"
        );
    }

    let model = models::create_entity(
        ctx,
        &entity_name,
        &tree.namespace,
        &tree.name,
        Some(graph.id()),
    )?;
    let model_guard = model.lock();
    models::materialize(ctx, &model, &tree.objects)
        .and_then(|()| {
            graph.update(|b| b.data_model = Some(model.id()));
            ctx.apply(graph, ModelOp::Ready)
        })
        .map_err(|e| {
            // Back to INITIAL with no model
            graph.update(|b| b.data_model = None);
            if graph.state() != ModelState::Initial {
                if let Err(reset) = ctx.apply(graph, ModelOp::Reset) {
                    warn!(
                        target: "choreo::compile",
                        id = %graph.id(),
                        error = %reset,
                        "Reset of graph failed"
                    );
                }
            }
            models::discard_built(ctx, &model);
            ctx.discard(ctx.registry().models(), model.id());
            e
        })?;
    drop(model_guard);

    info!(
        target: "choreo::compile",
        id = %graph.id(),
        model = %model.id(),
        objects = tree.objects.len(),
        "Compiled data dependency graph"
    );
    Ok(output.issues)
}
