//! Lifecycle flavors shared by every entity kind
//!
//! ## Model-object flavor
//!
//! Used by DataDependencyGraph, DataModel, DataObject and DataElement:
//!
//! ```text
//! INITIAL --ready--> READY --archive--> ARCHIVED --unarchive--> READY
//! {INITIAL, READY, ARCHIVED} --reset--> INITIAL
//! {INITIAL, READY, ARCHIVED} --delete--> DELETED (terminal)
//! ```
//!
//! `reset` covers the two derived reverts: a composite losing its last
//! child, and a composite whose delete cascade failed partway.
//!
//! ## Instance flavor
//!
//! Used by DataObjectInstance, DataElementInstance and DataValue:
//!
//! ```text
//! CREATED --initialize--> INITIALIZED --create--> CREATED
//! {CREATED, INITIALIZED} --archive--> ARCHIVED --unarchive--> (state before archive)
//! {CREATED, INITIALIZED, ARCHIVED} --delete--> DELETED (terminal)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Behavior common to both lifecycle flavors
///
/// States are encoded into a single byte so that a [`crate::StateCell`] can
/// pack them together with a version counter into one atomic word.
pub trait LifecycleState:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + Into<EntityState> + 'static
{
    /// Operations that drive this flavor
    type Op: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// State every new entity of this flavor starts in
    const INITIAL: Self;

    /// Single-byte encoding
    fn encode(self) -> u8;

    /// Inverse of [`LifecycleState::encode`]
    fn decode(raw: u8) -> Option<Self>;

    /// Target of `op` from `self`, or `None` when the guard rejects it
    ///
    /// `before_archive` is the state held when the entity was last archived;
    /// only the instance flavor consults it.
    fn target(self, op: Self::Op, before_archive: Self) -> Option<Self>;

    /// Check if this is a terminal state
    fn is_terminal(self) -> bool;

    /// Check if this is the archived state
    fn is_archived(self) -> bool;
}

// ========== Model-object flavor ==========

/// Lifecycle state of DataDependencyGraph, DataModel, DataObject, DataElement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelState {
    /// Created but not yet usable
    Initial,
    /// Usable; composites are READY iff they hold a READY child
    Ready,
    /// Soft-disabled, may be restored
    Archived,
    /// Terminal
    Deleted,
}

/// Operations of the model-object flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelOp {
    /// INITIAL -> READY
    Ready,
    /// READY -> ARCHIVED
    Archive,
    /// ARCHIVED -> READY
    Unarchive,
    /// any non-deleted state -> INITIAL
    Reset,
    /// any non-deleted state -> DELETED
    Delete,
}

impl ModelState {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelState::Initial => "INITIAL",
            ModelState::Ready => "READY",
            ModelState::Archived => "ARCHIVED",
            ModelState::Deleted => "DELETED",
        }
    }
}

impl ModelOp {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelOp::Ready => "ready",
            ModelOp::Archive => "archive",
            ModelOp::Unarchive => "unarchive",
            ModelOp::Reset => "reset",
            ModelOp::Delete => "delete",
        }
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ModelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LifecycleState for ModelState {
    type Op = ModelOp;

    const INITIAL: Self = ModelState::Initial;

    fn encode(self) -> u8 {
        match self {
            ModelState::Initial => 0,
            ModelState::Ready => 1,
            ModelState::Archived => 2,
            ModelState::Deleted => 3,
        }
    }

    fn decode(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ModelState::Initial),
            1 => Some(ModelState::Ready),
            2 => Some(ModelState::Archived),
            3 => Some(ModelState::Deleted),
            _ => None,
        }
    }

    fn target(self, op: ModelOp, _before_archive: Self) -> Option<Self> {
        use ModelState::*;
        match (self, op) {
            (Initial, ModelOp::Ready) => Some(Ready),
            (Ready, ModelOp::Archive) => Some(Archived),
            (Archived, ModelOp::Unarchive) => Some(Ready),
            (Initial | Ready | Archived, ModelOp::Reset) => Some(Initial),
            (Initial | Ready | Archived, ModelOp::Delete) => Some(Deleted),
            _ => None,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, ModelState::Deleted)
    }

    fn is_archived(self) -> bool {
        matches!(self, ModelState::Archived)
    }
}

// ========== Instance flavor ==========

/// Lifecycle state of DataObjectInstance, DataElementInstance, DataValue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceState {
    /// Exists without data
    Created,
    /// Holds data
    Initialized,
    /// Soft-disabled, may be restored
    Archived,
    /// Terminal
    Deleted,
}

/// Operations of the instance flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceOp {
    /// CREATED -> INITIALIZED
    Initialize,
    /// INITIALIZED -> CREATED
    Create,
    /// CREATED | INITIALIZED -> ARCHIVED
    Archive,
    /// ARCHIVED -> state before archive
    Unarchive,
    /// any non-deleted state -> DELETED
    Delete,
}

impl InstanceState {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Created => "CREATED",
            InstanceState::Initialized => "INITIALIZED",
            InstanceState::Archived => "ARCHIVED",
            InstanceState::Deleted => "DELETED",
        }
    }

    /// Check if the instance takes part in correlation resolution
    pub fn is_live(&self) -> bool {
        matches!(self, InstanceState::Created | InstanceState::Initialized)
    }
}

impl InstanceOp {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceOp::Initialize => "initialize",
            InstanceOp::Create => "create",
            InstanceOp::Archive => "archive",
            InstanceOp::Unarchive => "unarchive",
            InstanceOp::Delete => "delete",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for InstanceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LifecycleState for InstanceState {
    type Op = InstanceOp;

    const INITIAL: Self = InstanceState::Created;

    fn encode(self) -> u8 {
        match self {
            InstanceState::Created => 0,
            InstanceState::Initialized => 1,
            InstanceState::Archived => 2,
            InstanceState::Deleted => 3,
        }
    }

    fn decode(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(InstanceState::Created),
            1 => Some(InstanceState::Initialized),
            2 => Some(InstanceState::Archived),
            3 => Some(InstanceState::Deleted),
            _ => None,
        }
    }

    fn target(self, op: InstanceOp, before_archive: Self) -> Option<Self> {
        use InstanceState::*;
        match (self, op) {
            (Created, InstanceOp::Initialize) => Some(Initialized),
            (Initialized, InstanceOp::Create) => Some(Created),
            (Created | Initialized, InstanceOp::Archive) => Some(Archived),
            (Archived, InstanceOp::Unarchive) => match before_archive {
                Initialized => Some(Initialized),
                _ => Some(Created),
            },
            (Created | Initialized | Archived, InstanceOp::Delete) => Some(Deleted),
            _ => None,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, InstanceState::Deleted)
    }

    fn is_archived(self) -> bool {
        matches!(self, InstanceState::Archived)
    }
}

// ========== Flavor-erased state ==========

/// State of any entity, tagged with its flavor
///
/// Used where states of different kinds travel together: lifecycle events,
/// stored records and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityState {
    /// Model-object flavor
    Model(ModelState),
    /// Instance flavor
    Instance(InstanceState),
}

impl EntityState {
    /// Check if this is a terminal state
    pub fn is_deleted(&self) -> bool {
        matches!(
            self,
            EntityState::Model(ModelState::Deleted) | EntityState::Instance(InstanceState::Deleted)
        )
    }

    /// Model-object state, if this is one
    pub fn as_model(&self) -> Option<ModelState> {
        match self {
            EntityState::Model(s) => Some(*s),
            EntityState::Instance(_) => None,
        }
    }

    /// Instance state, if this is one
    pub fn as_instance(&self) -> Option<InstanceState> {
        match self {
            EntityState::Instance(s) => Some(*s),
            EntityState::Model(_) => None,
        }
    }
}

impl From<ModelState> for EntityState {
    fn from(state: ModelState) -> Self {
        EntityState::Model(state)
    }
}

impl From<InstanceState> for EntityState {
    fn from(state: InstanceState) -> Self {
        EntityState::Instance(state)
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::Model(s) => s.fmt(f),
            EntityState::Instance(s) => s.fmt(f),
        }
    }
}
