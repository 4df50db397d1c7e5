//! Lifecycle events
//!
//! Every successful transition is published as a [`LifecycleEvent`].
//! Listeners receive events in publication order; events of the same entity
//! are published while the entity's operation lock is held, so their order
//! is preserved end to end.

use crate::lifecycle::EntityState;
use crate::types::EntityKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A successful state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Kind of the entity
    pub kind: EntityKind,
    /// Entity identifier
    pub id: Uuid,
    /// State before
    pub old_state: EntityState,
    /// State after
    pub new_state: EntityState,
    /// Entity version after the transition
    pub version: u64,
}

impl LifecycleEvent {
    /// Check if this event announces the entity's deletion
    pub fn is_deletion(&self) -> bool {
        self.new_state.is_deleted()
    }
}

/// Receives lifecycle events
///
/// Implementations must not call back into the entity that published the
/// event: the publisher still holds its operation lock.
pub trait LifecycleListener: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &LifecycleEvent);
}
