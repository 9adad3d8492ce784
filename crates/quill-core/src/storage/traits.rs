//! Blob store trait definition.
//!
//! The `BlobStore` trait is the seam between the session orchestrator and
//! the persistence backends. Implementations persist exactly one
//! encrypted notes record under one fixed logical key and must never
//! observe plaintext.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::EncryptedNotesRecord;

/// Storage interface for the single encrypted notes record.
///
/// All implementations must ensure:
/// - Only ciphertext is persisted
/// - `set` replaces the record wholesale (no partial updates)
/// - `get` returns `None` for absent or structurally invalid records
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the persisted record, if any.
    async fn get(&self) -> Result<Option<EncryptedNotesRecord>>;

    /// Replace the persisted record.
    async fn set(&self, record: &EncryptedNotesRecord) -> Result<()>;

    /// Remove the persisted record.
    async fn clear(&self) -> Result<()>;
}
