//! Rotation must be all-or-nothing: if the re-encrypted records cannot
//! be persisted, the old passphrase keeps working.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tempfile::TempDir;

use quill_core::config::SessionConfig;
use quill_core::crypto::KdfConfig;
use quill_core::error::{QuillError, Result};
use quill_core::model::EncryptedNotesRecord;
use quill_core::session::Session;
use quill_core::storage::{BlobStore, DegradingStore, JsonFileStore, MetaFile};

/// Store that can be switched into a write-failing mode.
struct FlakyStore {
    inner: JsonFileStore,
    fail_writes: Arc<AtomicBool>,
}

#[async_trait]
impl BlobStore for FlakyStore {
    async fn get(&self) -> Result<Option<EncryptedNotesRecord>> {
        self.inner.get().await
    }

    async fn set(&self, record: &EncryptedNotesRecord) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(QuillError::Storage("disk full".to_string()));
        }
        self.inner.set(record).await
    }

    async fn clear(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(QuillError::Storage("disk full".to_string()));
        }
        self.inner.clear().await
    }
}

fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

#[tokio::test]
async fn test_failed_rotation_keeps_old_passphrase_working() {
    let dir = TempDir::new().unwrap();
    let fail_writes = Arc::new(AtomicBool::new(false));
    // The flaky store is the fallback, so there is no healthy backend
    // left to absorb the failure.
    let store = DegradingStore::from_parts(
        None,
        Box::new(FlakyStore {
            inner: JsonFileStore::new(&dir.path().join("notes.json")),
            fail_writes: Arc::clone(&fail_writes),
        }),
    );
    let session = Session::from_parts(
        store,
        MetaFile::new(&dir.path().join("session.json")),
        SessionConfig {
            kdf: KdfConfig {
                memory_kib: 8 * 1024,
                iterations: 1,
                parallelism: 1,
            },
            ..SessionConfig::default()
        },
    );

    session
        .setup(&secret("correct horse"), &secret("correct horse"))
        .await
        .unwrap();
    session.create_note("Survivor", "must remain").await.unwrap();

    fail_writes.store(true, Ordering::SeqCst);
    let err = session
        .rotate(
            &secret("correct horse"),
            &secret("battery staple"),
            &secret("battery staple"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QuillError::Storage(_)));
    fail_writes.store(false, Ordering::SeqCst);

    // The old passphrase still opens everything; the new one never took.
    session.lock(quill_core::LockReason::Manual);
    assert!(session.unlock(&secret("battery staple")).await.is_err());
    session.unlock(&secret("correct horse")).await.unwrap();
    let titles: Vec<String> = session
        .notes()
        .unwrap()
        .into_iter()
        .map(|note| note.title)
        .collect();
    assert!(titles.contains(&"Survivor".to_string()));
}
