//! Session metadata side file.
//!
//! Holds everything that must survive a lock but is not ciphertext
//! payload: the key-check record, sync bookkeeping, and preferences.
//! Stored as JSON next to the note database. None of these fields are
//! secret; the key-check blob is sealed and the rest is bookkeeping.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::KeyCheckRecord;
use crate::error::Result;
use crate::model::SyncMeta;
use crate::storage::fsutil::write_atomic;

/// Persisted per-installation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    #[serde(rename = "keyCheck")]
    pub key_check: Option<KeyCheckRecord>,
    pub sync: SyncMeta,
    /// Idle auto-lock timeout in milliseconds (0 = off)
    #[serde(rename = "autoLockMs")]
    pub auto_lock_ms: u64,
    /// Sync endpoint URL, if configured
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl SessionMeta {
    pub fn fresh(auto_lock_ms: u64) -> Self {
        Self {
            key_check: None,
            sync: SyncMeta::fresh(),
            auto_lock_ms,
            endpoint: None,
        }
    }
}

/// JSON file persistence for [`SessionMeta`].
pub struct MetaFile {
    path: PathBuf,
}

impl MetaFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Load the metadata, or `None` if the file is absent or unreadable.
    pub fn load(&self) -> Option<SessionMeta> {
        let raw = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn save(&self, meta: &SessionMeta) -> Result<()> {
        let value = serde_json::to_string_pretty(meta)
            .map_err(|e| crate::error::QuillError::Storage(e.to_string()))?;
        write_atomic(&self.path, value.as_bytes())?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
