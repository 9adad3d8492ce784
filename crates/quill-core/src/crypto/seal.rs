//! AES-256-GCM sealed blobs.
//!
//! A sealed blob carries a fresh random nonce plus ciphertext (with the
//! GCM tag appended) in base64, so it can travel unchanged through the
//! persisted record, the backup file, and the sync wire format.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto::key::SessionKey;
use crate::error::{QuillError, Result};

/// GCM standard nonce length (96 bits).
const NONCE_LENGTH: usize = 12;

/// Cipher identifier embedded in every sealed blob.
const CIPHER: &str = "AES-256-GCM";

/// An opaque sealed payload.
///
/// No semantic invariants beyond non-empty iv/ciphertext; decryption
/// fails closed if either field is tampered with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptedBlob {
    /// Base64-encoded 12-byte nonce
    #[serde(rename = "ivB64")]
    pub iv_b64: String,
    /// Base64-encoded ciphertext with the 16-byte GCM tag appended
    #[serde(rename = "ciphertextB64")]
    pub ciphertext_b64: String,
    /// Cipher identifier ("AES-256-GCM")
    pub cipher: String,
}

impl EncryptedBlob {
    /// Structural validity: non-empty base64 fields and a known cipher id.
    pub fn is_well_formed(&self) -> bool {
        !self.iv_b64.is_empty() && !self.ciphertext_b64.is_empty() && self.cipher == CIPHER
    }
}

fn cipher_for(key: &SessionKey) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| QuillError::CryptoUnavailable(format!("Invalid key length: {}", e)))
}

/// Seal a UTF-8 string under the session key.
///
/// A fresh random nonce is generated per call and never reused.
pub fn seal_string(plaintext: &str, key: &SessionKey) -> Result<EncryptedBlob> {
    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    getrandom::getrandom(&mut nonce_bytes)
        .map_err(|e| QuillError::CryptoUnavailable(format!("RNG unavailable: {}", e)))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher_for(key)?
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| QuillError::CryptoUnavailable(format!("AES-GCM encryption failed: {}", e)))?;

    Ok(EncryptedBlob {
        iv_b64: BASE64.encode(nonce_bytes),
        ciphertext_b64: BASE64.encode(ciphertext),
        cipher: CIPHER.to_string(),
    })
}

/// Open a sealed blob back into the original string.
///
/// # Errors
///
/// Returns [`QuillError::DataUnreadable`] on malformed fields, tag
/// mismatch, or non-UTF-8 plaintext. Never returns partial plaintext.
pub fn open_string(blob: &EncryptedBlob, key: &SessionKey) -> Result<String> {
    let nonce_bytes = BASE64
        .decode(&blob.iv_b64)
        .map_err(|e| QuillError::DataUnreadable(format!("Invalid nonce encoding: {}", e)))?;
    if nonce_bytes.len() != NONCE_LENGTH {
        return Err(QuillError::DataUnreadable(format!(
            "Nonce must be {} bytes",
            NONCE_LENGTH
        )));
    }
    let ciphertext = BASE64
        .decode(&blob.ciphertext_b64)
        .map_err(|e| QuillError::DataUnreadable(format!("Invalid ciphertext encoding: {}", e)))?;

    let plaintext = cipher_for(key)?
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|_| QuillError::DataUnreadable("AES-GCM authentication failed".to_string()))?;

    String::from_utf8(plaintext)
        .map_err(|_| QuillError::DataUnreadable("Plaintext is not valid UTF-8".to_string()))
}
