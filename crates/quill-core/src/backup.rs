//! Encrypted backup export and import.
//!
//! A backup carries the key check record and the sealed note record
//! exactly as persisted, plus the auto-lock preference. It is safe to
//! store anywhere: without the passphrase it is opaque ciphertext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AutoLockTimeout;
use crate::crypto::KeyCheckRecord;
use crate::error::{QuillError, Result};
use crate::model::EncryptedNotesRecord;
use crate::session::{LockReason, Session};

pub const BACKUP_VERSION: u32 = 1;

/// On-disk backup payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupFile {
    pub version: u32,
    #[serde(rename = "exportedAt")]
    pub exported_at: DateTime<Utc>,
    #[serde(rename = "keyCheck")]
    pub key_check: KeyCheckRecord,
    #[serde(rename = "encryptedNotes")]
    pub encrypted_notes: EncryptedNotesRecord,
    /// Auto-lock preference in milliseconds (0 = off)
    #[serde(rename = "autoLockMs")]
    pub auto_lock_ms: u64,
}

impl BackupFile {
    pub fn is_well_formed(&self) -> bool {
        self.version == BACKUP_VERSION
            && self.key_check.is_well_formed()
            && self.encrypted_notes.is_well_formed()
    }

    /// Parse and validate a raw backup document.
    pub fn parse(raw: &str) -> Result<Self> {
        let backup: BackupFile = serde_json::from_str(raw)
            .map_err(|e| QuillError::InvalidInput(format!("Invalid backup file: {}", e)))?;
        if !backup.is_well_formed() {
            return Err(QuillError::InvalidInput(
                "Invalid backup file: malformed records".to_string(),
            ));
        }
        Ok(backup)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| QuillError::Storage(e.to_string()))
    }
}

impl Session {
    /// Export the persisted ciphertext as a backup payload.
    pub async fn export_backup(&self) -> Result<BackupFile> {
        let status = self.status();
        let key_check = self
            .key_check()
            .ok_or_else(|| QuillError::InvalidInput("Passphrase setup required".to_string()))?;
        let encrypted_notes = self.stored_record().await?.ok_or_else(|| {
            QuillError::InvalidInput("No encrypted note data found to export".to_string())
        })?;

        Ok(BackupFile {
            version: BACKUP_VERSION,
            exported_at: Utc::now(),
            key_check,
            encrypted_notes,
            auto_lock_ms: status.auto_lock.as_millis(),
        })
    }

    /// Replace the local records with the backup's, wholesale. The
    /// session locks afterwards; the backup's passphrase is required to
    /// continue.
    pub async fn import_backup(&self, backup: &BackupFile) -> Result<()> {
        if !backup.is_well_formed() {
            return Err(QuillError::InvalidInput(
                "Invalid backup file: malformed records".to_string(),
            ));
        }
        self.replace_records(
            backup.key_check.clone(),
            &backup.encrypted_notes,
            AutoLockTimeout::from_millis(backup.auto_lock_ms),
        )
        .await?;
        self.lock(LockReason::BackupImported);
        info!("backup imported, unlock required");
        Ok(())
    }
}
