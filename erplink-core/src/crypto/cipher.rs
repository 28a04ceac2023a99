//! AES-256-CBC encryption for the device registration handshake.
//!
//! Uses AES-256-CBC with:
//! - 256-bit key derived from the device serial
//! - 128-bit (16 byte) IV, fresh per registration
//! - PKCS#7 padding
//! - Base64 transport encoding for both ciphertext and IV

use crate::crypto::kdf::SerialKey;
use crate::crypto::{CryptoError, Result};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Length of the CBC initialization vector in bytes.
pub const IV_LEN: usize = 16;

/// Generate a random initialization vector
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext` with AES-256-CBC and return the Base64 ciphertext.
pub fn encrypt_cbc_base64(key: &SerialKey, iv: &[u8], plaintext: &[u8]) -> Result<String> {
    check_iv(iv)?;
    let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    Ok(STANDARD.encode(ciphertext))
}

/// Decrypt a Base64 AES-256-CBC ciphertext.
///
/// Fails if the Base64 is malformed, the IV has the wrong length or the
/// padding does not verify (which is what a wrong key or IV looks like).
pub fn decrypt_cbc_base64(key: &SerialKey, iv: &[u8], ciphertext_b64: &str) -> Result<Vec<u8>> {
    check_iv(iv)?;
    let ciphertext = STANDARD.decode(ciphertext_b64.trim())?;
    if ciphertext.is_empty() {
        return Err(CryptoError::DecryptionFailed(
            "Cannot decrypt empty data".to_string(),
        ));
    }

    let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed("Invalid padding".to_string()))
}

fn check_iv(iv: &[u8]) -> Result<()> {
    if iv.len() != IV_LEN {
        return Err(CryptoError::InvalidIvLength {
            expected: IV_LEN,
            got: iv.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::derive_serial_key;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = derive_serial_key("12340000000001");
        let iv = generate_iv();

        let encrypted = encrypt_cbc_base64(&key, &iv, b"1234").unwrap();
        let decrypted = decrypt_cbc_base64(&key, &iv, &encrypted).unwrap();

        assert_eq!(decrypted, b"1234");
    }

    #[test]
    fn test_ciphertext_is_block_aligned() {
        let key = derive_serial_key("serial");
        let iv = [7u8; IV_LEN];

        let short = STANDARD
            .decode(encrypt_cbc_base64(&key, &iv, b"1234").unwrap())
            .unwrap();
        assert_eq!(short.len(), 16);

        // A full block of input still gets a full block of padding
        let full = STANDARD
            .decode(encrypt_cbc_base64(&key, &iv, &[b'x'; 16]).unwrap())
            .unwrap();
        assert_eq!(full.len(), 32);
    }

    #[test]
    fn test_different_ivs() {
        let key = derive_serial_key("12340000000001");
        let a = encrypt_cbc_base64(&key, &generate_iv(), b"same").unwrap();
        let b = encrypt_cbc_base64(&key, &generate_iv(), b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_or_garbles() {
        let iv = generate_iv();
        let plaintext = b"<RSAKeyValue></RSAKeyValue>";
        let encrypted =
            encrypt_cbc_base64(&derive_serial_key("11110000000001"), &iv, plaintext).unwrap();

        match decrypt_cbc_base64(&derive_serial_key("22220000000002"), &iv, &encrypted) {
            Ok(garbled) => assert_ne!(garbled, plaintext.to_vec()),
            Err(e) => assert!(matches!(e, CryptoError::DecryptionFailed(_))),
        }
    }

    #[test]
    fn test_invalid_iv_length_rejected() {
        let key = derive_serial_key("serial");
        let err = encrypt_cbc_base64(&key, &[0u8; 8], b"data").unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidIvLength {
                expected: 16,
                got: 8
            }
        ));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let key = derive_serial_key("serial");
        let err = decrypt_cbc_base64(&key, &[0u8; IV_LEN], "not base64!!").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidBase64(_)));
    }

    #[test]
    fn test_empty_data_fails() {
        let key = derive_serial_key("serial");
        assert!(decrypt_cbc_base64(&key, &[0u8; IV_LEN], "").is_err());
    }
}
