//! Passphrase verification via a sealed sentinel.
//!
//! At setup a fixed sentinel string is sealed under the freshly derived
//! key and stored alongside the derivation parameters. Unlock re-derives
//! the key from the stored parameters and must re-open the sentinel to
//! the exact original string. Verification therefore never touches real
//! note data, and a wrong passphrase is indistinguishable from a
//! tampered check blob.

use serde::{Deserialize, Serialize};

use crate::crypto::key::{derive_key, DerivedKey, KdfConfig, KdfParams};
use crate::crypto::seal::{open_string, seal_string, EncryptedBlob};
use crate::error::{QuillError, Result};

/// Current key-check record format version.
pub const KEY_CHECK_VERSION: u32 = 1;

/// Fixed sentinel plaintext sealed at setup.
const KEY_CHECK_SENTINEL: &str = "quill-key-check-v1";

/// Stored verification record: KDF parameters plus the sealed sentinel.
///
/// Created once at setup. On rotation it is replaced wholesale, never
/// field-patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyCheckRecord {
    pub version: u32,
    pub params: KdfParams,
    pub check: EncryptedBlob,
}

impl KeyCheckRecord {
    /// Structural validity used at trust boundaries (storage, wire, backup).
    pub fn is_well_formed(&self) -> bool {
        self.version == KEY_CHECK_VERSION
            && !self.params.salt_b64.is_empty()
            && self.params.iterations > 0
            && self.check.is_well_formed()
    }
}

/// Derive a fresh key for a new passphrase and build its check record.
pub fn create_key_check(passphrase: &str, config: &KdfConfig) -> Result<(DerivedKey, KeyCheckRecord)> {
    let derived = derive_key(passphrase, None, config)?;
    let check = seal_string(KEY_CHECK_SENTINEL, &derived.key)?;
    let record = KeyCheckRecord {
        version: KEY_CHECK_VERSION,
        params: derived.params.clone(),
        check,
    };
    Ok((derived, record))
}

/// Verify a candidate passphrase against a stored check record.
///
/// Re-derives the key from the record's salt and cost settings, then
/// re-opens the sentinel. Any failure to reproduce the exact sentinel
/// string is reported as [`QuillError::WrongPassphrase`].
pub fn verify_passphrase(passphrase: &str, record: &KeyCheckRecord) -> Result<DerivedKey> {
    if !record.is_well_formed() {
        return Err(QuillError::InvalidInput(
            "Passphrase setup record missing or malformed".to_string(),
        ));
    }

    let derived = derive_key(passphrase, Some(&record.params), &KdfConfig::default())?;
    match open_string(&record.check, &derived.key) {
        Ok(sentinel) if sentinel == KEY_CHECK_SENTINEL => Ok(derived),
        Ok(_) | Err(QuillError::DataUnreadable(_)) => Err(QuillError::WrongPassphrase),
        Err(other) => Err(other),
    }
}
