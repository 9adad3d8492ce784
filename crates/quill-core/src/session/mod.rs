//! Session orchestrator.
//!
//! One [`Session`] value owns the derived key, the decrypted note
//! collection, sync bookkeeping, and the idle clock. There is no global
//! state. Locking drops the key and plaintext synchronously and bumps a
//! session epoch, so an in-flight sync can never apply decrypted
//! results to a session that locked underneath it.
//!
//! Exclusive operations (setup, unlock, rotation, sync, conflict
//! resolution, backup import, wipe) share one busy flag: a call that
//! arrives while another is in flight is rejected with
//! [`QuillError::Busy`], never queued.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{is_valid_endpoint, AutoLockTimeout, SessionConfig};
use crate::crypto::{create_key_check, verify_passphrase, KeyCheckRecord, SessionKey};
use crate::error::{QuillError, Result};
use crate::merge::{merge_notes_keep_both, MergeConflict};
use crate::model::{
    active_notes, open_notes_record, seal_notes_snapshot, EncryptedNotesRecord, Note, SyncMeta,
};
use crate::storage::{BlobStore, DegradingStore, MetaFile, SessionMeta};
use crate::sync::{
    EncryptedState, HttpTransport, RestAdapter, SyncClientPayload, SyncRequest, SyncTransport,
};

const NOTES_DB_FILE: &str = "notes.db";
const NOTES_FALLBACK_FILE: &str = "notes.fallback.json";
const META_FILE: &str = "session.json";

/// Why a session was locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    /// Explicit lock by the collaborator
    Manual,
    /// Idle timeout expired
    Idle,
    /// Replaced ciphertext (sync or conflict resolution) no longer opens
    /// under the in-memory key
    DataRequiresUnlock,
    /// A backup was imported; its key may differ
    BackupImported,
}

impl std::fmt::Display for LockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            LockReason::Manual => "locked",
            LockReason::Idle => "locked (idle timeout)",
            LockReason::DataRequiresUnlock => "locked (synced data requires unlock)",
            LockReason::BackupImported => "locked (backup imported)",
        };
        f.write_str(text)
    }
}

/// What a completed sync did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local state accepted; nothing new from the server
    Pushed,
    /// Only the server had changed; its state replaced local wholesale
    FastForwarded,
    /// Both sides changed; keep-both merge applied and a conflict is
    /// now pending resolution
    Merged { conflicts: Vec<MergeConflict> },
}

/// An unresolved divergence from the last sync.
///
/// Holds both full encrypted states so either side can be restored
/// wholesale when the collaborator resolves.
#[derive(Debug, Clone)]
pub struct PendingConflict {
    pub detected_at: DateTime<Utc>,
    pub local_state: EncryptedState,
    pub server_state: EncryptedState,
    pub conflicts: Vec<MergeConflict>,
}

/// How to resolve a pending conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    KeepLocal,
    KeepServer,
}

/// Snapshot of session state for status displays.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub initialized: bool,
    pub unlocked: bool,
    pub degraded_storage: bool,
    pub active_note_count: usize,
    pub auto_lock: AutoLockTimeout,
    pub endpoint: Option<String>,
    pub sync: SyncMeta,
    pub pending_conflict: bool,
}

struct State {
    meta: SessionMeta,
    key: Option<SessionKey>,
    notes: Vec<Note>,
    epoch: u64,
    last_activity: Instant,
    pending_conflict: Option<PendingConflict>,
}

/// The one value that owns an unlocked (or locked) note store.
pub struct Session {
    store: DegradingStore,
    meta_file: MetaFile,
    config: SessionConfig,
    state: Mutex<State>,
    busy: AtomicBool,
}

/// Releases the busy flag when the guarded operation finishes.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Session {
    /// Open (or create) the session rooted at `data_dir`.
    pub fn open(data_dir: &Path, config: SessionConfig) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let store = DegradingStore::open(
            &data_dir.join(NOTES_DB_FILE),
            &data_dir.join(NOTES_FALLBACK_FILE),
        );
        let meta_file = MetaFile::new(&data_dir.join(META_FILE));
        Ok(Self::from_parts(store, meta_file, config))
    }

    /// Assemble from explicit backends.
    pub fn from_parts(store: DegradingStore, meta_file: MetaFile, config: SessionConfig) -> Self {
        let meta = meta_file
            .load()
            .unwrap_or_else(|| SessionMeta::fresh(config.auto_lock.as_millis()));
        Self {
            store,
            meta_file,
            config,
            state: Mutex::new(State {
                meta,
                key: None,
                notes: Vec::new(),
                epoch: 0,
                last_activity: Instant::now(),
                pending_conflict: None,
            }),
            busy: AtomicBool::new(false),
        }
    }

    fn acquire_busy(&self) -> Result<BusyGuard<'_>> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(QuillError::Busy);
        }
        Ok(BusyGuard(&self.busy))
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_state().meta.key_check.is_some()
    }

    pub fn is_unlocked(&self) -> bool {
        self.lock_state().key.is_some()
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.lock_state();
        SessionStatus {
            initialized: state.meta.key_check.is_some(),
            unlocked: state.key.is_some(),
            degraded_storage: self.store.is_degraded(),
            active_note_count: active_notes(&state.notes).len(),
            auto_lock: AutoLockTimeout::from_millis(state.meta.auto_lock_ms),
            endpoint: state.meta.endpoint.clone(),
            sync: state.meta.sync.clone(),
            pending_conflict: state.pending_conflict.is_some(),
        }
    }

    pub fn pending_conflict(&self) -> Option<PendingConflict> {
        self.lock_state().pending_conflict.clone()
    }

    /// First-time passphrase setup. Creates the key check record and an
    /// initial blank note.
    pub async fn setup(&self, passphrase: &SecretString, confirm: &SecretString) -> Result<()> {
        let _busy = self.acquire_busy()?;
        if self.is_initialized() {
            return Err(QuillError::InvalidInput(
                "Passphrase is already configured".to_string(),
            ));
        }
        if passphrase.expose_secret() != confirm.expose_secret() {
            return Err(QuillError::PassphraseMismatch);
        }

        let (derived, key_check) = create_key_check(passphrase.expose_secret(), &self.config.kdf)?;
        let notes = vec![Note::blank()];
        let record = seal_notes_snapshot(&notes, &derived.key)?;
        self.store.set(&record).await?;

        let mut state = self.lock_state();
        state.meta.key_check = Some(key_check);
        self.meta_file.save(&state.meta)?;
        state.key = Some(derived.key);
        state.notes = notes;
        state.last_activity = Instant::now();
        info!("passphrase configured, session unlocked");
        Ok(())
    }

    /// Unlock with the configured passphrase and load the collection.
    pub async fn unlock(&self, passphrase: &SecretString) -> Result<()> {
        let _busy = self.acquire_busy()?;
        let key_check = self
            .lock_state()
            .meta
            .key_check
            .clone()
            .ok_or_else(|| QuillError::InvalidInput("Passphrase setup required".to_string()))?;

        let derived = verify_passphrase(passphrase.expose_secret(), &key_check)?;

        let notes = match self.store.get().await? {
            Some(record) => self.reopen_applied(&record, &derived.key).await?,
            None => {
                // First unlock with no ciphertext on disk yet.
                let notes = vec![Note::blank()];
                self.store.set(&seal_notes_snapshot(&notes, &derived.key)?).await?;
                notes
            }
        };

        let mut state = self.lock_state();
        state.key = Some(derived.key);
        state.notes = notes;
        state.last_activity = Instant::now();
        info!("session unlocked");
        Ok(())
    }

    /// Drop the key and plaintext immediately and bump the epoch.
    pub fn lock(&self, reason: LockReason) {
        let mut state = self.lock_state();
        state.key = None;
        state.notes.clear();
        state.epoch += 1;
        info!(%reason, "session locked");
    }

    /// Reset the idle clock. Call on any collaborator interaction.
    pub fn record_activity(&self) {
        self.lock_state().last_activity = Instant::now();
    }

    /// Lock if the idle timeout has expired. Returns whether it locked.
    pub fn check_idle(&self) -> bool {
        let mut state = self.lock_state();
        if state.key.is_none() {
            return false;
        }
        let timeout = match AutoLockTimeout::from_millis(state.meta.auto_lock_ms).as_duration() {
            Some(timeout) => timeout,
            None => return false,
        };
        if state.last_activity.elapsed() < timeout {
            return false;
        }
        state.key = None;
        state.notes.clear();
        state.epoch += 1;
        info!(reason = %LockReason::Idle, "session locked");
        true
    }

    /// Active (non-tombstoned) notes, newest first.
    pub fn notes(&self) -> Result<Vec<Note>> {
        let state = self.lock_state();
        if state.key.is_none() {
            return Err(QuillError::UnlockRequired);
        }
        let mut notes: Vec<Note> = active_notes(&state.notes).into_iter().cloned().collect();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(notes)
    }

    pub fn note(&self, id: Uuid) -> Result<Note> {
        self.notes()?
            .into_iter()
            .find(|note| note.id == id)
            .ok_or_else(|| QuillError::InvalidInput(format!("No note with id {}", id)))
    }

    /// Take a working copy of the key and collection, failing when locked.
    fn unlocked_snapshot(&self) -> Result<(SessionKey, Vec<Note>, u64)> {
        let state = self.lock_state();
        let key = state.key.clone().ok_or(QuillError::UnlockRequired)?;
        Ok((key, state.notes.clone(), state.epoch))
    }

    /// Open a record the session just adopted (unlock, fast-forward,
    /// conflict resolution). A session never presents an empty
    /// collection: when every note is tombstoned the collection is
    /// replaced with a single blank note and persisted.
    async fn reopen_applied(
        &self,
        record: &EncryptedNotesRecord,
        key: &SessionKey,
    ) -> Result<Vec<Note>> {
        let mut notes = open_notes_record(record, key)?;
        if active_notes(&notes).is_empty() {
            notes = vec![Note::blank()];
            self.store.set(&seal_notes_snapshot(&notes, key)?).await?;
        }
        Ok(notes)
    }

    /// Persist `notes` sealed under `key`, then commit them in memory if
    /// the session has not locked in the meantime.
    async fn persist_and_commit(&self, key: &SessionKey, notes: Vec<Note>, epoch: u64) -> Result<()> {
        let record = seal_notes_snapshot(&notes, key)?;
        self.store.set(&record).await?;

        let mut state = self.lock_state();
        if state.epoch == epoch {
            state.notes = notes;
        }
        Ok(())
    }

    pub async fn create_note(&self, title: &str, content: &str) -> Result<Note> {
        let (key, mut notes, epoch) = self.unlocked_snapshot()?;
        let note = Note::new(title, content);
        notes.insert(0, note.clone());
        self.persist_and_commit(&key, notes, epoch).await?;
        self.record_activity();
        Ok(note)
    }

    pub async fn update_note(&self, id: Uuid, title: &str, content: &str) -> Result<Note> {
        let (key, mut notes, epoch) = self.unlocked_snapshot()?;
        let note = notes
            .iter_mut()
            .find(|note| note.id == id && !note.deleted)
            .ok_or_else(|| QuillError::InvalidInput(format!("No note with id {}", id)))?;
        let trimmed = title.trim();
        note.title = if trimmed.is_empty() {
            crate::model::UNTITLED.to_string()
        } else {
            trimmed.to_string()
        };
        note.content = content.to_string();
        note.updated_at = Utc::now();
        let updated = note.clone();
        self.persist_and_commit(&key, notes, epoch).await?;
        self.record_activity();
        Ok(updated)
    }

    /// Tombstone a note. Deleting the last active note is rejected with
    /// no state change.
    pub async fn delete_note(&self, id: Uuid) -> Result<()> {
        let (key, mut notes, epoch) = self.unlocked_snapshot()?;
        if !notes.iter().any(|note| note.id == id && !note.deleted) {
            return Err(QuillError::InvalidInput(format!("No note with id {}", id)));
        }
        if active_notes(&notes).len() == 1 {
            return Err(QuillError::InvalidInput(
                "Cannot delete the last remaining note".to_string(),
            ));
        }
        for note in notes.iter_mut() {
            if note.id == id {
                note.deleted = true;
                note.updated_at = Utc::now();
            }
        }
        self.persist_and_commit(&key, notes, epoch).await?;
        self.record_activity();
        Ok(())
    }

    /// Rotate the passphrase: re-encrypt everything under a fresh key and
    /// swap the key check and note records together. On persistence
    /// failure both are rolled back to their pre-rotation bytes.
    pub async fn rotate(
        &self,
        current: &SecretString,
        next: &SecretString,
        confirm: &SecretString,
    ) -> Result<()> {
        let _busy = self.acquire_busy()?;
        let (key_check, notes, epoch) = {
            let state = self.lock_state();
            if state.key.is_none() {
                return Err(QuillError::UnlockRequired);
            }
            let key_check = state.meta.key_check.clone().ok_or_else(|| {
                QuillError::InvalidInput("Passphrase setup required".to_string())
            })?;
            (key_check, state.notes.clone(), state.epoch)
        };

        if next.expose_secret() != confirm.expose_secret() {
            return Err(QuillError::PassphraseMismatch);
        }
        if next.expose_secret() == current.expose_secret() {
            return Err(QuillError::InvalidInput(
                "New passphrase must differ from the current one".to_string(),
            ));
        }
        verify_passphrase(current.expose_secret(), &key_check)?;

        let (next_derived, next_check) = create_key_check(next.expose_secret(), &self.config.kdf)?;
        let next_record = seal_notes_snapshot(&notes, &next_derived.key)?;

        let previous_record = self.store.get().await?;
        self.store.set(&next_record).await?;

        let save_result = {
            let mut state = self.lock_state();
            state.meta.key_check = Some(next_check);
            match self.meta_file.save(&state.meta) {
                Ok(()) => {
                    if state.epoch == epoch {
                        state.key = Some(next_derived.key);
                        state.last_activity = Instant::now();
                    }
                    Ok(())
                }
                Err(err) => {
                    state.meta.key_check = Some(key_check);
                    Err(err)
                }
            }
        };

        if let Err(err) = save_result {
            // All-or-nothing: restore the pre-rotation ciphertext.
            match &previous_record {
                Some(record) => {
                    if let Err(rollback_err) = self.store.set(record).await {
                        warn!(error = %rollback_err, "rotation rollback failed");
                    }
                }
                None => {
                    if let Err(rollback_err) = self.store.clear().await {
                        warn!(error = %rollback_err, "rotation rollback failed");
                    }
                }
            }
            return Err(err);
        }

        info!("passphrase rotated, data re-encrypted");
        Ok(())
    }

    pub fn set_endpoint(&self, endpoint: &str) -> Result<()> {
        if !is_valid_endpoint(endpoint) {
            return Err(QuillError::InvalidInput(format!(
                "Invalid sync endpoint: {}",
                endpoint
            )));
        }
        let mut state = self.lock_state();
        state.meta.endpoint = Some(endpoint.to_string());
        self.meta_file.save(&state.meta)
    }

    pub fn set_auto_lock(&self, timeout: AutoLockTimeout) -> Result<()> {
        let mut state = self.lock_state();
        state.meta.auto_lock_ms = timeout.as_millis();
        self.meta_file.save(&state.meta)
    }

    /// Sync against the configured endpoint.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let endpoint = self
            .lock_state()
            .meta
            .endpoint
            .clone()
            .ok_or_else(|| QuillError::InvalidInput("Sync endpoint not configured".to_string()))?;
        let transport = HttpTransport::new(&endpoint)?;
        self.sync_with(Box::new(transport)).await
    }

    /// Sync through an explicit transport.
    pub async fn sync_with(&self, transport: Box<dyn SyncTransport>) -> Result<SyncOutcome> {
        let _busy = self.acquire_busy()?;

        let (key_check, key, sync_meta, epoch) = {
            let state = self.lock_state();
            if state.pending_conflict.is_some() {
                return Err(QuillError::ConflictPending);
            }
            let key_check = state.meta.key_check.clone().ok_or_else(|| {
                QuillError::InvalidInput("Passphrase setup required".to_string())
            })?;
            (
                key_check,
                state.key.clone(),
                state.meta.sync.clone(),
                state.epoch,
            )
        };

        let local_record = match self.store.get().await? {
            Some(record) => record,
            None => {
                return Err(QuillError::InvalidInput(
                    "No encrypted notes are available to sync".to_string(),
                ))
            }
        };
        let local_state = EncryptedState {
            key_check,
            encrypted_notes: local_record.clone(),
        };

        let request = SyncRequest::new(SyncClientPayload {
            device_id: sync_meta.device_id.clone(),
            known_server_revision: sync_meta.known_server_revision.clone(),
            local_revision: local_record.revision_id.clone(),
            sent_at: Utc::now(),
            encrypted_state: local_state.clone(),
        })?;

        let adapter = RestAdapter::new(transport, self.config.retry.clone());
        let response = adapter.exchange(&request).await?;

        let remote_state = response.server_encrypted_state.clone();
        let local_revision = local_record.revision_id.clone();
        let remote_revision = remote_state
            .as_ref()
            .map(|state| state.encrypted_notes.revision_id.clone());
        let has_remote_update = remote_revision
            .as_ref()
            .map(|revision| *revision != local_revision)
            .unwrap_or(false);
        let last_synced = sync_meta.last_synced_local_revision.as_deref();
        let local_changed = last_synced.is_some_and(|last| local_revision != last);
        let remote_changed = last_synced
            .zip(remote_revision.as_deref())
            .is_some_and(|(last, remote)| remote != last);
        let conflict_signal = response.conflict.is_some();
        let divergence = has_remote_update && local_changed && remote_changed;

        let outcome = if conflict_signal || divergence {
            let key = key.ok_or(QuillError::UnlockRequired)?;
            let remote_state = remote_state.ok_or_else(|| {
                QuillError::MalformedMessage("Conflict reported without server state".to_string())
            })?;

            let local_notes = open_notes_record(&local_record, &key)?;
            let server_notes = open_notes_record(&remote_state.encrypted_notes, &key)?;
            let merge = merge_notes_keep_both(&local_notes, &server_notes);
            let merged_record = seal_notes_snapshot(&merge.merged, &key)?;
            self.store.set(&merged_record).await?;

            let mut state = self.lock_state();
            state.meta.sync.last_synced_local_revision = Some(merged_record.revision_id.clone());
            state.pending_conflict = Some(PendingConflict {
                detected_at: Utc::now(),
                local_state,
                server_state: remote_state,
                conflicts: merge.conflicts.clone(),
            });
            if state.epoch == epoch {
                state.notes = merge.merged;
            }
            self.finish_sync(&mut state, &response.server_revision)?;
            SyncOutcome::Merged {
                conflicts: merge.conflicts,
            }
        } else if has_remote_update {
            let remote_state = remote_state.ok_or_else(|| {
                QuillError::MalformedMessage("Remote update without server state".to_string())
            })?;
            self.store.set(&remote_state.encrypted_notes).await?;

            // Decrypt outside the state lock; the epoch decides whether
            // the result may be applied.
            let reopened = match key.as_ref() {
                Some(key) => Some(self.reopen_applied(&remote_state.encrypted_notes, key).await),
                None => None,
            };

            let mut state = self.lock_state();
            state.meta.key_check = Some(remote_state.key_check.clone());
            state.meta.sync.last_synced_local_revision = remote_revision;
            if state.epoch == epoch {
                match reopened {
                    Some(Ok(notes)) => state.notes = notes,
                    Some(Err(_)) => {
                        state.key = None;
                        state.notes.clear();
                        state.epoch += 1;
                        info!(reason = %LockReason::DataRequiresUnlock, "session locked");
                    }
                    None => {}
                }
            }
            self.finish_sync(&mut state, &response.server_revision)?;
            SyncOutcome::FastForwarded
        } else {
            let mut state = self.lock_state();
            state.meta.sync.last_synced_local_revision = Some(local_revision);
            self.finish_sync(&mut state, &response.server_revision)?;
            SyncOutcome::Pushed
        };

        Ok(outcome)
    }

    /// Shared bookkeeping tail: revision tracking and metadata persistence.
    fn finish_sync(&self, state: &mut State, server_revision: &Option<String>) -> Result<()> {
        if let Some(revision) = server_revision {
            state.meta.sync.known_server_revision = Some(revision.clone());
        }
        state.meta.sync.last_synced_at = Some(Utc::now());
        self.meta_file.save(&state.meta)
    }

    /// Resolve the pending conflict by keeping one side wholesale.
    pub async fn resolve_conflict(&self, resolution: ConflictResolution) -> Result<()> {
        let _busy = self.acquire_busy()?;
        let (conflict, key, epoch) = {
            let state = self.lock_state();
            let conflict = state
                .pending_conflict
                .clone()
                .ok_or_else(|| QuillError::InvalidInput("No pending conflict".to_string()))?;
            (conflict, state.key.clone(), state.epoch)
        };

        let chosen = match resolution {
            ConflictResolution::KeepLocal => conflict.local_state,
            ConflictResolution::KeepServer => conflict.server_state,
        };
        self.store.set(&chosen.encrypted_notes).await?;

        let reopened = match key.as_ref() {
            Some(key) => Some(self.reopen_applied(&chosen.encrypted_notes, key).await),
            None => None,
        };

        let mut state = self.lock_state();
        state.meta.key_check = Some(chosen.key_check);
        state.meta.sync.last_synced_local_revision =
            Some(chosen.encrypted_notes.revision_id.clone());
        state.pending_conflict = None;
        self.meta_file.save(&state.meta)?;
        if state.epoch == epoch {
            match reopened {
                Some(Ok(notes)) => state.notes = notes,
                Some(Err(_)) => {
                    state.key = None;
                    state.notes.clear();
                    state.epoch += 1;
                    info!(reason = %LockReason::DataRequiresUnlock, "session locked");
                }
                None => {}
            }
        }
        info!(?resolution, "pending conflict resolved");
        Ok(())
    }

    pub(crate) fn key_check(&self) -> Option<KeyCheckRecord> {
        self.lock_state().meta.key_check.clone()
    }

    pub(crate) async fn stored_record(&self) -> Result<Option<EncryptedNotesRecord>> {
        self.store.get().await
    }

    /// Swap in a foreign key check and note record wholesale (backup
    /// import). Busy-guarded like the other exclusive operations.
    pub(crate) async fn replace_records(
        &self,
        key_check: KeyCheckRecord,
        record: &EncryptedNotesRecord,
        auto_lock: AutoLockTimeout,
    ) -> Result<()> {
        let _busy = self.acquire_busy()?;
        self.store.set(record).await?;

        let mut state = self.lock_state();
        state.meta.key_check = Some(key_check);
        state.meta.auto_lock_ms = auto_lock.as_millis();
        state.pending_conflict = None;
        self.meta_file.save(&state.meta)
    }

    /// Erase everything: ciphertext, key check, sync bookkeeping. The
    /// device id is regenerated and passphrase setup is required again.
    pub async fn wipe(&self) -> Result<()> {
        let _busy = self.acquire_busy()?;
        self.store.clear().await?;

        let mut state = self.lock_state();
        state.meta = SessionMeta::fresh(self.config.auto_lock.as_millis());
        self.meta_file.save(&state.meta)?;
        state.key = None;
        state.notes.clear();
        state.pending_conflict = None;
        state.epoch += 1;
        info!("local data wiped");
        Ok(())
    }
}
