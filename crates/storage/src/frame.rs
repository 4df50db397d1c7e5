//! On-disk framing for blobs and entity records
//!
//! ## Format
//!
//! ```text
//! [magic: 4 bytes "CHDF"][format version: u32 LE][payload len: u64 LE][payload][crc32: u32 LE]
//! ```
//!
//! The CRC covers everything before it. Files are written with
//! write-fsync-rename so a reader never sees a half-written frame.

use choreo_core::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

const FRAME_MAGIC: &[u8; 4] = b"CHDF";
const FRAME_VERSION: u32 = 1;
const HEADER_SIZE: usize = 16;
const CRC_SIZE: usize = 4;

/// Wrap `payload` in a checksummed frame
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    buf.extend_from_slice(FRAME_MAGIC);
    buf.extend_from_slice(&FRAME_VERSION.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    buf.extend_from_slice(payload);
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Validate a frame and return its payload
///
/// # Errors
/// `Corruption` on bad magic, unknown version, length mismatch or CRC mismatch.
pub fn decode(data: &[u8]) -> Result<&[u8]> {
    if data.len() < HEADER_SIZE + CRC_SIZE {
        return Err(Error::Corruption(format!(
            "frame too short: {} bytes",
            data.len()
        )));
    }
    if &data[0..4] != FRAME_MAGIC {
        return Err(Error::Corruption("invalid frame magic".into()));
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FRAME_VERSION {
        return Err(Error::Corruption(format!(
            "unsupported frame version {}",
            version
        )));
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&data[8..16]);
    let len = u64::from_le_bytes(len_bytes) as usize;
    if data.len() != HEADER_SIZE + len + CRC_SIZE {
        return Err(Error::Corruption(format!(
            "frame length mismatch: header says {}, file holds {}",
            len,
            data.len().saturating_sub(HEADER_SIZE + CRC_SIZE)
        )));
    }
    let crc_offset = HEADER_SIZE + len;
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&data[crc_offset..]);
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = crc32fast::hash(&data[..crc_offset]);
    if stored != computed {
        return Err(Error::Corruption(format!(
            "checksum mismatch: stored {:#010x}, computed {:#010x}",
            stored, computed
        )));
    }
    Ok(&data[HEADER_SIZE..crc_offset])
}

/// Write `payload` framed to `path` using write-fsync-rename
pub fn write_file(path: &Path, payload: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)?;
    file.write_all(&encode(payload))?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&temp_path, path)?;

    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

/// Read and validate a framed file
///
/// Returns `Ok(None)` if the file does not exist.
pub fn read_file(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(decode(&data)?.to_vec())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remove a file; a missing file is not an error
pub fn remove_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let framed = encode(b"payload");
        assert_eq!(decode(&framed).unwrap(), b"payload");
    }

    #[test]
    fn test_empty_payload() {
        let framed = encode(b"");
        assert_eq!(decode(&framed).unwrap(), b"");
    }

    #[test]
    fn test_flipped_bit_is_detected() {
        let mut framed = encode(b"payload");
        framed[HEADER_SIZE + 2] ^= 0x01;
        assert!(matches!(decode(&framed), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_truncated_frame_is_detected() {
        let framed = encode(b"payload");
        assert!(matches!(
            decode(&framed[..framed.len() - 1]),
            Err(Error::Corruption(_))
        ));
        assert!(matches!(decode(&framed[..3]), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_bad_magic() {
        let mut framed = encode(b"x");
        framed[0] = b'X';
        assert!(matches!(decode(&framed), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        write_file(&path, b"hello").unwrap();
        assert_eq!(read_file(&path).unwrap().unwrap(), b"hello");
        remove_file(&path).unwrap();
        assert!(read_file(&path).unwrap().is_none());
        remove_file(&path).unwrap();
    }
}
