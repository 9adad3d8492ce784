//! Key derivation using Argon2id.
//!
//! This module derives session keys from passphrases using the Argon2id
//! algorithm, which is memory-hard and resistant to GPU-based attacks.
//! The derivation parameters travel with the key-check record so that
//! any device holding the same passphrase, salt, and cost settings
//! derives a byte-identical key.

use argon2::Argon2;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::error::{QuillError, Result};

/// Minimum passphrase length in characters.
pub const MIN_PASSPHRASE_CHARS: usize = 8;

/// Length of the derived key in bytes (32 bytes = 256 bits for AES-256-GCM).
const KEY_LENGTH: usize = 32;

/// Length of a freshly generated salt in bytes.
const SALT_LENGTH: usize = 16;

/// KDF algorithm identifier recorded alongside derived material.
const KDF_ALGORITHM: &str = "argon2id";

/// Cipher identifier for keys produced by this module.
const CIPHER: &str = "AES-256-GCM";

/// Tunable KDF cost settings.
///
/// The defaults balance security and interactive unlock latency:
/// 64 MiB of memory, 3 iterations, single lane. They are policy, not
/// universal truth; deployments may raise them via [`crate::SessionConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfConfig {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Time cost (iteration count)
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }
}

/// Derivation parameters that must be stored to re-derive the same key.
///
/// Serialized into [`crate::crypto::KeyCheckRecord`] and carried in the
/// sync wire format, so every field is wire-safe (salt as base64).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KdfParams {
    /// KDF algorithm id ("argon2id")
    pub kdf: String,
    /// Cipher the derived key targets ("AES-256-GCM")
    pub cipher: String,
    /// Base64-encoded random salt (>= 16 bytes)
    #[serde(rename = "saltB64")]
    pub salt_b64: String,
    /// Argon2 time cost
    pub iterations: u32,
    /// Argon2 memory cost in KiB
    #[serde(rename = "memoryKib")]
    pub memory_kib: u32,
    /// Argon2 parallelism
    pub parallelism: u32,
}

impl KdfParams {
    fn from_config(config: &KdfConfig, salt: &[u8]) -> Self {
        Self {
            kdf: KDF_ALGORITHM.to_string(),
            cipher: CIPHER.to_string(),
            salt_b64: BASE64.encode(salt),
            iterations: config.iterations,
            memory_kib: config.memory_kib,
            parallelism: config.parallelism,
        }
    }

    fn salt_bytes(&self) -> Result<Vec<u8>> {
        let salt = BASE64
            .decode(&self.salt_b64)
            .map_err(|e| QuillError::InvalidInput(format!("Invalid salt encoding: {}", e)))?;
        if salt.len() < SALT_LENGTH {
            return Err(QuillError::InvalidInput(format!(
                "Salt must be at least {} bytes",
                SALT_LENGTH
            )));
        }
        Ok(salt)
    }
}

/// A session key derived from a passphrase.
///
/// Key material is zeroized from memory when dropped, reducing the
/// window of exposure.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; KEY_LENGTH],
}

impl SessionKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key: bytes }
    }

    /// Raw key bytes. Avoid storing or logging; use only for immediate
    /// seal/open operations.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Result of a derivation: the key plus the parameters needed to
/// reproduce it.
pub struct DerivedKey {
    pub key: SessionKey,
    pub params: KdfParams,
}

/// Validate that a passphrase meets the minimum length requirement.
pub fn validate_passphrase(passphrase: &str) -> Result<()> {
    if passphrase.chars().count() < MIN_PASSPHRASE_CHARS {
        return Err(QuillError::WeakPassphrase {
            minimum: MIN_PASSPHRASE_CHARS,
        });
    }
    Ok(())
}

/// Derive a session key from a passphrase.
///
/// Without `params`, a fresh random salt is generated and the cost
/// settings come from `config`. With `params` supplied (unlock on an
/// existing store), derivation is deterministic: the same passphrase,
/// salt, and cost settings always yield an identical key.
///
/// # Errors
///
/// - [`QuillError::WeakPassphrase`] if the passphrase is under 8 characters
/// - [`QuillError::CryptoUnavailable`] if the platform RNG or Argon2
///   parameters are unusable
pub fn derive_key(
    passphrase: &str,
    params: Option<&KdfParams>,
    config: &KdfConfig,
) -> Result<DerivedKey> {
    validate_passphrase(passphrase)?;

    let params = match params {
        Some(existing) => existing.clone(),
        None => {
            let mut salt = [0u8; SALT_LENGTH];
            getrandom::getrandom(&mut salt)
                .map_err(|e| QuillError::CryptoUnavailable(format!("RNG unavailable: {}", e)))?;
            KdfParams::from_config(config, &salt)
        }
    };

    let salt = params.salt_bytes()?;
    let argon2_params = argon2::Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LENGTH),
    )
    .map_err(|e| QuillError::CryptoUnavailable(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut key_bytes = [0u8; KEY_LENGTH];
    argon2
        .hash_password_into(passphrase.as_bytes(), &salt, &mut key_bytes)
        .map_err(|e| QuillError::CryptoUnavailable(format!("Key derivation failed: {}", e)))?;

    Ok(DerivedKey {
        key: SessionKey::from_bytes(key_bytes),
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> KdfConfig {
        // Low cost to keep the test suite quick; determinism is what matters.
        KdfConfig {
            memory_kib: 8 * 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_key_derivation_deterministic() {
        let first = derive_key("test-passphrase", None, &fast_config()).unwrap();
        let second = derive_key("test-passphrase", Some(&first.params), &fast_config()).unwrap();

        assert_eq!(first.key.as_bytes(), second.key.as_bytes());
        assert_eq!(first.params, second.params);
    }

    #[test]
    fn test_fresh_salt_per_derivation() {
        let first = derive_key("test-passphrase", None, &fast_config()).unwrap();
        let second = derive_key("test-passphrase", None, &fast_config()).unwrap();

        assert_ne!(first.params.salt_b64, second.params.salt_b64);
        assert_ne!(first.key.as_bytes(), second.key.as_bytes());
    }

    #[test]
    fn test_different_passphrase_different_key() {
        let first = derive_key("passphrase-one", None, &fast_config()).unwrap();
        let second = derive_key("passphrase-two", Some(&first.params), &fast_config()).unwrap();

        assert_ne!(first.key.as_bytes(), second.key.as_bytes());
    }

    #[test]
    fn test_short_passphrase_rejected() {
        let result = derive_key("short", None, &fast_config());
        assert!(matches!(
            result,
            Err(QuillError::WeakPassphrase { minimum: 8 })
        ));
    }

    #[test]
    fn test_exactly_min_length_accepted() {
        assert!(validate_passphrase("12345678").is_ok());
        assert!(validate_passphrase("1234567").is_err());
    }

    #[test]
    fn test_short_salt_rejected() {
        let mut params = derive_key("test-passphrase", None, &fast_config())
            .unwrap()
            .params;
        params.salt_b64 = base64::engine::general_purpose::STANDARD.encode(b"short");

        let result = derive_key("test-passphrase", Some(&params), &fast_config());
        assert!(matches!(result, Err(QuillError::InvalidInput(_))));
    }

    #[test]
    fn test_session_key_debug_redacts() {
        let derived = derive_key("test-passphrase", None, &fast_config()).unwrap();
        let debug_output = format!("{:?}", derived.key);

        assert!(debug_output.contains("REDACTED"));
        let key_hex = hex::encode(&derived.key.as_bytes()[..4]);
        assert!(!debug_output.contains(&key_hex));
    }

    #[test]
    fn test_params_record_algorithm_ids() {
        let derived = derive_key("test-passphrase", None, &fast_config()).unwrap();
        assert_eq!(derived.params.kdf, "argon2id");
        assert_eq!(derived.params.cipher, "AES-256-GCM");
    }
}
