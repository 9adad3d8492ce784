//! Degrading backend selector.
//!
//! Tries the structured primary backend first and switches permanently to
//! the fallback if the primary is unavailable or any call fails. The
//! choice is remembered for the process lifetime; there is no per-call
//! re-probing. Stale copies on whichever backend is not in use are
//! cleared so truth is never split across two stores.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::warn;

use crate::error::{QuillError, Result};
use crate::model::EncryptedNotesRecord;
use crate::storage::kv::JsonFileStore;
use crate::storage::sqlite::SqliteStore;
use crate::storage::traits::BlobStore;

/// Blob store with one-way primary-to-fallback degradation.
pub struct DegradingStore {
    primary: Option<Box<dyn BlobStore>>,
    fallback: Box<dyn BlobStore>,
    degraded: AtomicBool,
}

impl DegradingStore {
    /// Open the SQLite primary at `db_path` with a JSON-file fallback at
    /// `fallback_path`. If the primary cannot be opened, the store starts
    /// degraded.
    pub fn open(db_path: &Path, fallback_path: &Path) -> Self {
        let fallback: Box<dyn BlobStore> = Box::new(JsonFileStore::new(fallback_path));
        match SqliteStore::open(db_path) {
            Ok(primary) => Self::from_parts(Some(Box::new(primary)), fallback),
            Err(err) => {
                warn!(error = %err, "primary blob store unavailable, using fallback");
                let store = Self::from_parts(None, fallback);
                store.degraded.store(true, Ordering::SeqCst);
                store
            }
        }
    }

    /// Assemble from explicit backends. `primary = None` starts degraded.
    pub fn from_parts(primary: Option<Box<dyn BlobStore>>, fallback: Box<dyn BlobStore>) -> Self {
        let degraded = primary.is_none();
        Self {
            primary,
            fallback,
            degraded: AtomicBool::new(degraded),
        }
    }

    /// Whether the store has switched to the fallback backend.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn active_primary(&self) -> Option<&dyn BlobStore> {
        if self.is_degraded() {
            None
        } else {
            self.primary.as_deref()
        }
    }

    /// Switch to the fallback for the rest of the process lifetime and
    /// best-effort clear the stale copy left on the primary.
    async fn degrade(&self, cause: &QuillError) {
        if self.degraded.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(error = %cause, "blob store degraded to key-value fallback");
        if let Some(primary) = self.primary.as_deref() {
            let _ = primary.clear().await;
        }
    }
}

#[async_trait]
impl BlobStore for DegradingStore {
    async fn get(&self) -> Result<Option<EncryptedNotesRecord>> {
        if let Some(primary) = self.active_primary() {
            match primary.get().await {
                Ok(record) => return Ok(record),
                Err(err) => self.degrade(&err).await,
            }
        }
        self.fallback.get().await
    }

    async fn set(&self, record: &EncryptedNotesRecord) -> Result<()> {
        if let Some(primary) = self.active_primary() {
            match primary.set(record).await {
                Ok(()) => {
                    // Primary holds the truth now; drop any stale
                    // fallback copy so the stores cannot disagree.
                    self.fallback.clear().await?;
                    return Ok(());
                }
                Err(err) => self.degrade(&err).await,
            }
        }
        self.fallback.set(record).await
    }

    async fn clear(&self) -> Result<()> {
        if let Some(primary) = self.active_primary() {
            if let Err(err) = primary.clear().await {
                self.degrade(&err).await;
            }
        }
        self.fallback.clear().await
    }
}
