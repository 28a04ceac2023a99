//! Cryptographic primitives for the ERP device-pairing protocol.
//!
//! This module provides:
//! - Serial-based AES-256 key derivation (vendor mandated)
//! - AES-256-CBC encryption for the registration handshake
//! - Conversion of vendor `RSAKeyValue` XML into a DER SubjectPublicKeyInfo
//! - The MD5 password digest required by the ERP login endpoint

pub mod cipher;
pub mod kdf;
pub mod password;
pub mod rsa_key;

pub use cipher::{decrypt_cbc_base64, encrypt_cbc_base64, generate_iv, IV_LEN};
pub use kdf::{derive_serial_key, SerialKey, SERIAL_KEY_LEN};
pub use password::erp_password_hash;
pub use rsa_key::RsaKeyValue;

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid key format: {0}")]
    KeyFormat(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid IV length: expected {expected}, got {got}")]
    InvalidIvLength { expected: usize, got: usize },

    #[error("Invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
