//! Core data model: notes, encrypted records, and sync metadata.
//!
//! Notes are soft-deleted only: a delete sets the tombstone flag and
//! bumps `updated_at`, but the note is never removed from the serialized
//! collection. Physical deletion would be indistinguishable, after
//! independent edits on two devices, from "never existed", which breaks
//! merge correctness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{open_string, seal_string, EncryptedBlob, SessionKey};
use crate::error::{QuillError, Result};

/// Current encrypted-notes record format version.
pub const NOTES_RECORD_VERSION: u32 = 1;

/// Title given to synthesized blank notes and untitled conflict copies.
pub const UNTITLED: &str = "Untitled";

/// A single note.
///
/// Decrypted snapshots are untrusted input: every field except the
/// sealing envelope defaults when absent, so a sparse note from an
/// older or foreign writer normalizes instead of poisoning the whole
/// collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Immutable unique identifier
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Last modification timestamp; bumped on every edit and on delete
    #[serde(rename = "updatedAt", default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Tombstone flag; tombstoned notes are retained for merge correctness
    #[serde(default)]
    pub deleted: bool,
}

impl Note {
    /// Create a fresh note with a new id and current timestamp.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: Uuid::new_v4(),
            title: if title.trim().is_empty() {
                UNTITLED.to_string()
            } else {
                title
            },
            content: content.into(),
            updated_at: Utc::now(),
            deleted: false,
        }
    }

    /// A blank untitled note, used to satisfy the non-empty invariant.
    pub fn blank() -> Self {
        Self::new(UNTITLED, "")
    }

    /// Title/content/tombstone equality, ignoring timestamps.
    pub fn content_equals(&self, other: &Note) -> bool {
        self.title == other.title && self.content == other.content && self.deleted == other.deleted
    }
}

/// Non-tombstoned notes, in collection order.
pub fn active_notes(notes: &[Note]) -> Vec<&Note> {
    notes.iter().filter(|note| !note.deleted).collect()
}

/// The single persisted record: a sealed snapshot of the whole collection.
///
/// Never mutated in place; every write produces a fresh `revision_id`,
/// which is the sync protocol's sole "did anything change" primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptedNotesRecord {
    pub version: u32,
    #[serde(rename = "revisionId")]
    pub revision_id: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    pub payload: EncryptedBlob,
}

impl EncryptedNotesRecord {
    /// Structural validity used at trust boundaries (storage, wire, backup).
    pub fn is_well_formed(&self) -> bool {
        self.version == NOTES_RECORD_VERSION
            && !self.revision_id.is_empty()
            && self.payload.is_well_formed()
    }
}

/// Opaque revision token, regenerated on every persisted write.
pub fn new_revision_id() -> String {
    Uuid::new_v4().to_string()
}

/// Seal a snapshot of the collection into a fresh record.
pub fn seal_notes_snapshot(notes: &[Note], key: &SessionKey) -> Result<EncryptedNotesRecord> {
    let plaintext = serde_json::to_string(notes)?;
    Ok(EncryptedNotesRecord {
        version: NOTES_RECORD_VERSION,
        revision_id: new_revision_id(),
        updated_at: Utc::now(),
        payload: seal_string(&plaintext, key)?,
    })
}

/// Open a persisted record back into a note collection.
///
/// Anything other than a JSON array of notes is reported as
/// [`QuillError::DataUnreadable`]; the caller already verified the
/// passphrase, so failure here means corruption, not a wrong key.
pub fn open_notes_record(record: &EncryptedNotesRecord, key: &SessionKey) -> Result<Vec<Note>> {
    let plaintext = open_string(&record.payload, key)?;
    let notes: Vec<Note> = serde_json::from_str(&plaintext)
        .map_err(|e| QuillError::DataUnreadable(format!("Note collection unreadable: {}", e)))?;
    Ok(notes)
}

/// Per-device sync bookkeeping.
///
/// `device_id` is stable per installation and regenerated only on a full
/// wipe. Revision fields are never taken from remote input without
/// validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncMeta {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "knownServerRevision")]
    pub known_server_revision: Option<String>,
    #[serde(rename = "lastSyncedLocalRevision")]
    pub last_synced_local_revision: Option<String>,
    #[serde(rename = "lastSyncedAt")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SyncMeta {
    /// Fresh metadata for a new installation (or after a wipe).
    pub fn fresh() -> Self {
        Self {
            device_id: Uuid::new_v4().to_string(),
            known_server_revision: None,
            last_synced_local_revision: None,
            last_synced_at: None,
        }
    }
}
