//! Error types for choreodata
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! # Categories
//!
//! | Category | Variants | Retried by the core? |
//! |----------|----------|----------------------|
//! | Guard | `LifecycleViolation`, `IllegalModification`, `ValueInUse` | never |
//! | Contention | `StateTransitionExhausted` | never; caller may retry the whole call |
//! | Lookup | `NotFound`, `AmbiguousCorrelation`, `AlreadyRegistered` | never |
//! | Compile | `CompilationFailed` | never |
//! | Cascade | `DeletionFailed`, `ManualInterventionRequired` | never; the latter pages an operator |
//! | Collaborators | `Io`, `Serialization`, `Corruption` | never; propagated unchanged |

use crate::compile::CompilationIssue;
use crate::lifecycle::EntityState;
use crate::types::EntityKind;
use std::fmt;
use std::io;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for choreodata operations
pub type Result<T> = std::result::Result<T, Error>;

/// Direction of a reversible cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CascadeDirection {
    /// Forward operation was `archive`, compensation is `unarchive`
    Archive,
    /// Forward operation was `unarchive`, compensation is `archive`
    Unarchive,
}

impl fmt::Display for CascadeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeDirection::Archive => f.write_str("archive"),
            CascadeDirection::Unarchive => f.write_str("unarchive"),
        }
    }
}

/// Error types for choreodata
#[derive(Debug, Error)]
pub enum Error {
    /// Transition not permitted from the entity's current state
    #[error("{kind} {id}: cannot {operation} in state {state}")]
    LifecycleViolation {
        /// Entity kind
        kind: EntityKind,
        /// Entity identifier
        id: Uuid,
        /// State the entity was in
        state: EntityState,
        /// Attempted operation
        operation: String,
    },

    /// Bounded CAS retries on a contended transition ran out
    #[error("{kind} {id}: transition '{operation}' still contended after {attempts} attempts")]
    StateTransitionExhausted {
        /// Entity kind
        kind: EntityKind,
        /// Entity identifier
        id: Uuid,
        /// Attempted operation
        operation: String,
        /// Attempts made
        attempts: u32,
    },

    /// Structural edit of an entity owned by a compiled DataModel
    #[error("{kind} {id}: illegal modification of a model-owned entity: {reason}")]
    IllegalModification {
        /// Entity kind
        kind: EntityKind,
        /// Entity identifier
        id: Uuid,
        /// What was attempted
        reason: String,
    },

    /// Schema compilation reported errors
    #[error("{kind} {id}: compilation failed with {} issue(s)", issues.len())]
    CompilationFailed {
        /// Kind of the compiled entity
        kind: EntityKind,
        /// Identifier of the compiled entity
        id: Uuid,
        /// Every issue the compiler reported, in order
        issues: Vec<CompilationIssue>,
    },

    /// DataValue still referenced by element instances
    #[error("data value {id} is still referenced by {references} element instance(s)")]
    ValueInUse {
        /// DataValue identifier
        id: Uuid,
        /// Number of referencing element instances
        references: usize,
    },

    /// Correlation query matched more than one live instance
    #[error("correlation query on {scope} matched {matches} instances; supply more properties")]
    AmbiguousCorrelation {
        /// Human-readable description of the query scope
        scope: String,
        /// Number of matches
        matches: usize,
    },

    /// Entity or blob not found
    #[error("{what} not found: {key}")]
    NotFound {
        /// What was looked up
        what: String,
        /// Lookup key
        key: String,
    },

    /// Identifier already present in a registry index
    #[error("{kind} {id} is already registered")]
    AlreadyRegistered {
        /// Entity kind
        kind: EntityKind,
        /// Colliding identifier
        id: Uuid,
    },

    /// A delete cascade failed; the composite was reset to INITIAL
    #[error("{kind} {id}: deletion failed, entity reset to INITIAL: {source}")]
    DeletionFailed {
        /// Composite kind
        kind: EntityKind,
        /// Composite identifier
        id: Uuid,
        /// Failure raised by the cascade
        source: Box<Error>,
    },

    /// A compensating rollback failed; the entity is inconsistent
    ///
    /// This is the one error that must reach an operator. It is never
    /// retried automatically.
    #[error(
        "{kind} {id}: {direction} cascade failed and its rollback failed for {} child(ren); manual intervention required (cause: {cause})",
        rollback_failed.len()
    )]
    ManualInterventionRequired {
        /// Composite kind
        kind: EntityKind,
        /// Composite identifier
        id: Uuid,
        /// Direction of the forward cascade
        direction: CascadeDirection,
        /// Children whose forward step succeeded
        completed: Vec<Uuid>,
        /// Child whose forward step failed
        failed: Uuid,
        /// Children whose compensation also failed
        rollback_failed: Vec<Uuid>,
        /// Original forward failure
        cause: Box<Error>,
    },

    /// Invalid argument
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// I/O error from a persistence collaborator
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored data failed an integrity check
    #[error("data corruption: {0}")]
    Corruption(String),
}

impl Error {
    /// Create a NotFound error
    pub fn not_found(what: impl Into<String>, key: impl fmt::Display) -> Self {
        Error::NotFound {
            what: what.into(),
            key: key.to_string(),
        }
    }

    /// Create an InvalidInput error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create an IllegalModification error
    pub fn illegal_modification(kind: EntityKind, id: Uuid, reason: impl Into<String>) -> Self {
        Error::IllegalModification {
            kind,
            id,
            reason: reason.into(),
        }
    }

    /// Check if this error leaves the call fatal
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ManualInterventionRequired { .. } | Error::StateTransitionExhausted { .. }
        )
    }

    /// Check if this error must be escalated to an operator
    pub fn requires_operator(&self) -> bool {
        matches!(self, Error::ManualInterventionRequired { .. })
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check if this is a lifecycle guard violation
    pub fn is_lifecycle_violation(&self) -> bool {
        matches!(self, Error::LifecycleViolation { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
