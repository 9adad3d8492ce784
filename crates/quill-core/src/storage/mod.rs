//! Durable encrypted blob storage.
//!
//! Exactly one [`crate::model::EncryptedNotesRecord`] is persisted at a
//! time. A structured SQLite backend is tried first; if it is unavailable
//! or any call fails, the process degrades permanently to a simple JSON
//! key-value file. Truth is never split across the two backends: on
//! switching, the stale copy on the unused backend is cleared.

pub mod fallback;
pub mod fsutil;
pub mod kv;
pub mod meta;
pub mod sqlite;
pub mod traits;

pub use fallback::DegradingStore;
pub use kv::JsonFileStore;
pub use meta::{MetaFile, SessionMeta};
pub use sqlite::SqliteStore;
pub use traits::BlobStore;
