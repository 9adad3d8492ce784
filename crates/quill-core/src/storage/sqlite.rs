//! SQLite-backed primary blob store.
//!
//! A single `records` table keyed by a fixed logical id holds the
//! serialized encrypted notes record. The payload stored in the row is
//! already ciphertext-bearing JSON; SQLite only ever sees sealed bytes.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};

use crate::error::{QuillError, Result};
use crate::model::EncryptedNotesRecord;
use crate::storage::traits::BlobStore;

/// Fixed logical key for the single persisted record.
const RECORD_ID: &str = "encrypted-notes";

/// Primary structured backend.
pub struct SqliteStore {
    #[allow(dead_code)]
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| QuillError::Storage("SQLite connection poisoned".to_string()))
    }
}

#[async_trait]
impl BlobStore for SqliteStore {
    async fn get(&self) -> Result<Option<EncryptedNotesRecord>> {
        let conn = self.lock_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM records WHERE id = ?1",
                [RECORD_ID],
                |row| row.get(0),
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        // Structurally invalid rows are treated as absent rather than
        // poisoning the session; the record is replaced on next write.
        match serde_json::from_str::<EncryptedNotesRecord>(&raw) {
            Ok(record) if record.is_well_formed() => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    async fn set(&self, record: &EncryptedNotesRecord) -> Result<()> {
        let value = serde_json::to_string(record)
            .map_err(|e| QuillError::Storage(format!("Record serialization failed: {}", e)))?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO records (id, value) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET value = excluded.value",
            [RECORD_ID, value.as_str()],
        )?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM records WHERE id = ?1", [RECORD_ID])?;
        Ok(())
    }
}
