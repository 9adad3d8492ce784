//! Error types for Quill core operations.
//!
//! This module defines the error hierarchy for all core operations.
//! Errors are descriptive at the core level; the CLI layer will map these
//! to user-friendly messages.

use thiserror::Error;

/// Result type alias for Quill operations.
pub type Result<T> = std::result::Result<T, QuillError>;

/// Core error type for Quill operations.
#[derive(Debug, Error)]
pub enum QuillError {
    /// Passphrase shorter than the minimum length
    #[error("Passphrase must be at least {minimum} characters")]
    WeakPassphrase { minimum: usize },

    /// Passphrase and confirmation fields differ during setup or rotation
    #[error("Passphrases do not match")]
    PassphraseMismatch,

    /// The sentinel check failed to re-open under the derived key
    #[error("Wrong passphrase")]
    WrongPassphrase,

    /// Decryption failed despite a verified passphrase (storage corruption)
    #[error("Encrypted data unreadable: {0}")]
    DataUnreadable(String),

    /// No usable AEAD or KDF primitive
    #[error("Crypto primitive unavailable: {0}")]
    CryptoUnavailable(String),

    /// Operation requires an unlocked session
    #[error("Unlock required")]
    UnlockRequired,

    /// A guarded operation is already in flight; the call was rejected
    #[error("Another session operation is in progress")]
    Busy,

    /// Network-level sync failure (endpoint unreachable, transport error)
    #[error("Sync unreachable: {0}")]
    SyncUnreachable(String),

    /// Server responded with a non-retryable failing HTTP status
    #[error("Sync request failed ({status})")]
    SyncRejected { status: u16 },

    /// Wire message failed schema validation
    #[error("Malformed sync message: {0}")]
    MalformedMessage(String),

    /// A previous sync left an unresolved conflict
    #[error("Resolve the pending conflict before syncing again")]
    ConflictPending,

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<rusqlite::Error> for QuillError {
    fn from(err: rusqlite::Error) -> Self {
        QuillError::Storage(format!("SQLite error: {}", err))
    }
}

impl From<std::io::Error> for QuillError {
    fn from(err: std::io::Error) -> Self {
        QuillError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for QuillError {
    fn from(err: serde_json::Error) -> Self {
        QuillError::DataUnreadable(err.to_string())
    }
}
