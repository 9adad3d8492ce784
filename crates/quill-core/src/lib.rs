//! # Quill Core
//!
//! Core library for Quill - a local-first, end-to-end-encrypted note
//! store with passphrase-derived keys and optimistic sync.
//!
//! This crate provides the domain logic, crypto, storage, and sync
//! machinery independent of the CLI interface.
//!
//! ## Architecture
//!
//! - **crypto**: Key derivation, passphrase verification, sealed blobs
//! - **model**: Notes, tombstones, encrypted snapshot records
//! - **storage**: Durable blob store with backend fallback
//! - **merge**: Conflict-aware keep-both merge engine
//! - **sync**: Wire schema and retrying sync adapter
//! - **session**: The orchestrator that owns key, notes, and busy state
//! - **backup**: Encrypted backup export/import
//!
//! All note content is encrypted client-side; the sync wire and the
//! storage backends only ever see ciphertext.

pub mod backup;
pub mod config;
pub mod crypto;
pub mod error;
pub mod merge;
pub mod model;
pub mod session;
pub mod storage;
pub mod sync;

pub use backup::BackupFile;
pub use config::{AutoLockTimeout, SessionConfig};
pub use error::{QuillError, Result};
pub use merge::{merge_notes_keep_both, MergeConflict, MergeOutcome, Side};
pub use model::Note;
pub use session::{ConflictResolution, LockReason, Session, SyncOutcome};
pub use sync::RetryPolicy;

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
