//! Cascading composite operations
//!
//! ## Reversible cascades (archive / unarchive)
//!
//! Children are visited in insertion order. Each child that completes the
//! forward step is recorded. When a child fails, every recorded child is
//! compensated, again in insertion order. Outcomes:
//!
//! | Forward | Compensation | Result |
//! |---------|--------------|--------|
//! | all ok | - | `Ok(())`, caller transitions the parent |
//! | child fails | all ok | the child's error, parent unchanged |
//! | child fails | some fail | `ManualInterventionRequired` |
//!
//! ## Delete cascades
//!
//! Children are deleted in order and the first failure stops the walk. The
//! caller resets the parent to INITIAL and reports `DeletionFailed`.

use crate::context::Context;
use crate::entity::{Entity, EntityBody};
use choreo_core::{CascadeDirection, EntityKind, Error, ModelOp, ModelState, Result};
use tracing::{error, warn};
use uuid::Uuid;

/// Failure of the forward walk, with the outcome of its compensation
#[derive(Debug)]
pub(crate) struct CascadeFailure {
    pub completed: Vec<Uuid>,
    pub failed: Uuid,
    pub rollback_failed: Vec<Uuid>,
    pub cause: Error,
}

/// Apply `forward` to each child; on failure compensate the completed ones
pub(crate) fn run_reversible<T>(
    children: &[T],
    id_of: impl Fn(&T) -> Uuid,
    mut forward: impl FnMut(&T) -> Result<()>,
    mut compensate: impl FnMut(&T) -> Result<()>,
) -> std::result::Result<(), CascadeFailure> {
    let mut done: Vec<&T> = Vec::with_capacity(children.len());
    for child in children {
        if let Err(cause) = forward(child) {
            let mut rollback_failed = Vec::new();
            for finished in &done {
                if compensate(*finished).is_err() {
                    rollback_failed.push(id_of(*finished));
                }
            }
            return Err(CascadeFailure {
                completed: done.iter().map(|c| id_of(*c)).collect(),
                failed: id_of(child),
                rollback_failed,
                cause,
            });
        }
        done.push(child);
    }
    Ok(())
}

/// Run a reversible cascade for the composite `(kind, id)` and map its
/// failure to the error the caller reports
pub(crate) fn reversible<T>(
    kind: EntityKind,
    id: Uuid,
    direction: CascadeDirection,
    children: &[T],
    id_of: impl Fn(&T) -> Uuid,
    forward: impl FnMut(&T) -> Result<()>,
    compensate: impl FnMut(&T) -> Result<()>,
) -> Result<()> {
    let failure = match run_reversible(children, id_of, forward, compensate) {
        Ok(()) => return Ok(()),
        Err(failure) => failure,
    };

    if failure.rollback_failed.is_empty() {
        warn!(
            target: "choreo::cascade",
            kind = %kind,
            id = %id,
            direction = %direction,
            failed = %failure.failed,
            rolled_back = failure.completed.len(),
            error = %failure.cause,
            "Cascade failed; completed children rolled back"
        );
        return Err(failure.cause);
    }

    error!(
        target: "choreo::cascade",
        kind = %kind,
        id = %id,
        direction = %direction,
        completed = ?failure.completed,
        failed = %failure.failed,
        rollback_failed = ?failure.rollback_failed,
        error = %failure.cause,
        "Cascade rollback failed; manual intervention required"
    );
    Err(Error::ManualInterventionRequired {
        kind,
        id,
        direction,
        completed: failure.completed,
        failed: failure.failed,
        rollback_failed: failure.rollback_failed,
        cause: Box::new(failure.cause),
    })
}

/// Apply `step` to each child, stopping at the first failure
pub(crate) fn run_to_completion<T>(
    children: &[T],
    mut step: impl FnMut(&T) -> Result<()>,
) -> Result<()> {
    for child in children {
        step(child)?;
    }
    Ok(())
}

/// Reset a composite whose delete cascade failed and wrap the cause
pub(crate) fn deletion_failed<B>(ctx: &Context, entity: &Entity<B>, cause: Error) -> Error
where
    B: EntityBody<State = ModelState>,
{
    if let Err(reset) = ctx.apply(entity, ModelOp::Reset) {
        error!(
            target: "choreo::cascade",
            kind = %entity.kind(),
            id = %entity.uuid(),
            error = %reset,
            "Reset after failed deletion was rejected"
        );
    }
    warn!(
        target: "choreo::cascade",
        kind = %entity.kind(),
        id = %entity.uuid(),
        error = %cause,
        "Delete cascade failed"
    );
    Error::DeletionFailed {
        kind: entity.kind(),
        id: entity.uuid(),
        source: Box::new(cause),
    }
}
