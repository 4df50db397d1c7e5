//! Collaborator traits
//!
//! The engine talks to persistence only through these narrow contracts:
//!
//! - [`PersistenceProvider`]: opaque byte blobs (schema sources, payloads)
//! - [`EntityStore`]: structured entity records for restart recovery
//!
//! Implementations own their retry policy; the core never retries around
//! them and propagates their errors unchanged.

use crate::error::Result;
use crate::types::EntityKind;
use crate::lifecycle::EntityState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Byte-blob persistence
pub trait PersistenceProvider: Send + Sync {
    /// Store `bytes` under `(collection, id)`, replacing any previous blob
    fn store(&self, collection: &str, id: Uuid, bytes: &[u8]) -> Result<()>;

    /// Load the blob under `(collection, id)`
    ///
    /// # Errors
    /// `NotFound` if nothing is stored there.
    fn load(&self, collection: &str, id: Uuid) -> Result<Vec<u8>>;

    /// Remove the blob under `(collection, id)`; removing nothing is not an error
    fn remove(&self, collection: &str, id: Uuid) -> Result<()>;
}

/// Persisted form of one entity
///
/// The kind-specific fields travel as a JSON tree in `body`; the lifecycle
/// cell travels as its three parts so it can be restored exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity kind
    pub kind: EntityKind,
    /// Entity identifier
    pub id: Uuid,
    /// Lifecycle state
    pub state: EntityState,
    /// State held when the entity was last archived
    pub before_archive: EntityState,
    /// Lifecycle version
    pub version: u64,
    /// Kind-specific fields
    pub body: serde_json::Value,
}

/// Structured persistence of entity records
pub trait EntityStore: Send + Sync {
    /// Insert or replace a record
    fn save(&self, record: &EntityRecord) -> Result<()>;

    /// Delete a record; deleting a missing record is not an error
    fn delete(&self, kind: EntityKind, id: Uuid) -> Result<()>;

    /// Every record of one kind, in no particular order
    fn load_all(&self, kind: EntityKind) -> Result<Vec<EntityRecord>>;
}
