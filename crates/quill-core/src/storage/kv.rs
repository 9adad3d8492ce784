//! JSON-file fallback blob store.
//!
//! The simple key-value backend used when the structured SQLite store is
//! unavailable: one JSON file holding the serialized encrypted record.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::model::EncryptedNotesRecord;
use crate::storage::fsutil::write_atomic;
use crate::storage::traits::BlobStore;

/// Fallback key-value backend.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

#[async_trait]
impl BlobStore for JsonFileStore {
    async fn get(&self) -> Result<Option<EncryptedNotesRecord>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_str::<EncryptedNotesRecord>(&raw) {
            Ok(record) if record.is_well_formed() => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    async fn set(&self, record: &EncryptedNotesRecord) -> Result<()> {
        let value = serde_json::to_string(record)
            .map_err(|e| crate::error::QuillError::Storage(e.to_string()))?;
        write_atomic(&self.path, value.as_bytes())?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SessionKey;
    use crate::model::{seal_notes_snapshot, Note};
    use tempfile::tempdir;

    fn sample_record() -> EncryptedNotesRecord {
        let key = SessionKey::from_bytes([9; 32]);
        seal_notes_snapshot(&[Note::new("A", "body")], &key).unwrap()
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(&dir.path().join("notes.json"));

        assert!(store.get().await.unwrap().is_none());

        let record = sample_record();
        store.set(&record).await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some(record));

        store.clear().await.unwrap();
        assert!(store.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_missing_file_is_ok() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(&dir.path().join("absent.json"));
        assert!(store.clear().await.is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.json");
        fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(store.get().await.unwrap().is_none());
    }
}
