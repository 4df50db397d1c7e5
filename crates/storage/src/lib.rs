//! Storage layer for choreodata
//!
//! Reference implementations of the persistence collaborators:
//! - MemoryBlobStore / FileBlobStore: byte blobs (schema sources, payloads)
//! - MemoryEntityStore / FileEntityStore: entity records for restart recovery
//!
//! File-backed stores share one checksummed frame format (`frame`) and
//! write every file with write-fsync-rename.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blob;
pub mod entity_store;
pub mod frame;

pub use blob::{FileBlobStore, MemoryBlobStore};
pub use entity_store::{FileEntityStore, MemoryEntityStore};
