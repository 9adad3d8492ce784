//! Cryptographic operations for Quill.
//!
//! This module provides key derivation, sealed-blob encryption, and
//! passphrase verification using well-audited libraries:
//! - **Argon2id**: Memory-hard key derivation function
//! - **AES-256-GCM**: Authenticated encryption for sealed blobs
//!
//! ## Security Model
//!
//! - Passphrase-derived 256-bit session keys, zeroized from memory on drop
//! - Fresh random nonce per seal; decryption fails closed on tampering
//! - Passphrase verification via a sealed sentinel, never against real data
//! - No plaintext passphrases or keys ever persisted
//!
//! ## Threat Model
//!
//! We defend against:
//! - Theft of the encrypted note store or backup file
//! - A remote sync service observing or tampering with synced state
//! - Offline brute-force attacks on the passphrase
//!
//! We do NOT defend against:
//! - Compromised OS / keylogger
//! - Access to an unlocked session / memory

pub mod key;
pub mod keycheck;
pub mod seal;

pub use key::{derive_key, validate_passphrase, DerivedKey, KdfConfig, KdfParams, SessionKey};
pub use keycheck::{create_key_check, verify_passphrase, KeyCheckRecord};
pub use seal::{open_string, seal_string, EncryptedBlob};
