//! Byte-blob persistence providers
//!
//! - [`MemoryBlobStore`]: DashMap-backed, for tests and ephemeral contexts
//! - [`FileBlobStore`]: one framed file per blob under `<root>/<collection>/`

use crate::frame;
use choreo_core::{Error, PersistenceProvider, Result};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// In-memory blob store
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<(String, Uuid), Vec<u8>>,
}

impl MemoryBlobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs across all collections
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Check if the store holds no blobs
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl PersistenceProvider for MemoryBlobStore {
    fn store(&self, collection: &str, id: Uuid, bytes: &[u8]) -> Result<()> {
        self.blobs
            .insert((collection.to_string(), id), bytes.to_vec());
        Ok(())
    }

    fn load(&self, collection: &str, id: Uuid) -> Result<Vec<u8>> {
        self.blobs
            .get(&(collection.to_string(), id))
            .map(|b| b.value().clone())
            .ok_or_else(|| Error::not_found(format!("blob in {}", collection), id))
    }

    fn remove(&self, collection: &str, id: Uuid) -> Result<()> {
        self.blobs.remove(&(collection.to_string(), id));
        Ok(())
    }
}

/// File-backed blob store
///
/// Collection names become directory names and must be plain identifiers.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        debug!(target: "choreo::storage", root = ?root, "Opened blob store");
        Ok(Self { root })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf> {
        validate_collection(collection)?;
        Ok(self.root.join(collection))
    }

    fn blob_path(&self, collection: &str, id: Uuid) -> Result<PathBuf> {
        Ok(self.collection_dir(collection)?.join(format!("{}.blob", id)))
    }
}

impl PersistenceProvider for FileBlobStore {
    fn store(&self, collection: &str, id: Uuid, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(self.collection_dir(collection)?)?;
        frame::write_file(&self.blob_path(collection, id)?, bytes)
    }

    fn load(&self, collection: &str, id: Uuid) -> Result<Vec<u8>> {
        frame::read_file(&self.blob_path(collection, id)?)?
            .ok_or_else(|| Error::not_found(format!("blob in {}", collection), id))
    }

    fn remove(&self, collection: &str, id: Uuid) -> Result<()> {
        frame::remove_file(&self.blob_path(collection, id)?)
    }
}

fn validate_collection(collection: &str) -> Result<()> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_input(format!(
            "invalid collection name '{}'",
            collection
        )))
    }
}
