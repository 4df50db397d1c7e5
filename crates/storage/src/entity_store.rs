//! Entity record stores
//!
//! - [`MemoryEntityStore`]: keeps records as JSON text, so every save goes
//!   through the same serialization step as a durable store
//! - [`FileEntityStore`]: MessagePack records in framed files under
//!   `<root>/<kind>/<id>.rec`

use crate::frame;
use choreo_core::{EntityKind, EntityRecord, EntityStore, Error, Result};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// In-memory entity store
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    records: DashMap<(EntityKind, Uuid), String>,
}

impl MemoryEntityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records of one kind
    pub fn count(&self, kind: EntityKind) -> usize {
        self.records.iter().filter(|e| e.key().0 == kind).count()
    }
}

impl EntityStore for MemoryEntityStore {
    fn save(&self, record: &EntityRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.records.insert((record.kind, record.id), json);
        Ok(())
    }

    fn delete(&self, kind: EntityKind, id: Uuid) -> Result<()> {
        self.records.remove(&(kind, id));
        Ok(())
    }

    fn load_all(&self, kind: EntityKind) -> Result<Vec<EntityRecord>> {
        self.records
            .iter()
            .filter(|e| e.key().0 == kind)
            .map(|e| serde_json::from_str(e.value()).map_err(Error::from))
            .collect()
    }
}

/// File-backed entity store
#[derive(Debug, Clone)]
pub struct FileEntityStore {
    root: PathBuf,
}

impl FileEntityStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for kind in EntityKind::ALL {
            std::fs::create_dir_all(root.join(kind.as_str()))?;
        }
        debug!(target: "choreo::storage", root = ?root, "Opened entity store");
        Ok(Self { root })
    }

    fn record_path(&self, kind: EntityKind, id: Uuid) -> PathBuf {
        self.root.join(kind.as_str()).join(format!("{}.rec", id))
    }
}

impl EntityStore for FileEntityStore {
    fn save(&self, record: &EntityRecord) -> Result<()> {
        let bytes =
            rmp_serde::to_vec_named(record).map_err(|e| Error::Serialization(e.to_string()))?;
        frame::write_file(&self.record_path(record.kind, record.id), &bytes)
    }

    fn delete(&self, kind: EntityKind, id: Uuid) -> Result<()> {
        frame::remove_file(&self.record_path(kind, id))
    }

    fn load_all(&self, kind: EntityKind) -> Result<Vec<EntityRecord>> {
        let dir = self.root.join(kind.as_str());
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("rec") {
                // Leftover temp files from an interrupted write
                warn!(target: "choreo::storage", path = ?path, "Skipping non-record file");
                continue;
            }
            if let Some(bytes) = frame::read_file(&path)? {
                let record: EntityRecord = rmp_serde::from_slice(&bytes)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                records.push(record);
            }
        }
        Ok(records)
    }
}
