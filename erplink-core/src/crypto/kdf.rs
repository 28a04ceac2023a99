//! Serial-based key derivation for the registration handshake.
//!
//! The ERP derives the AES-256 key for device registration directly from the
//! device serial: the serial is concatenated with itself and the first 32
//! bytes of its UTF-8 encoding form the key, zero-padded when shorter. There
//! is no salt and no iteration count. Any deviation breaks the handshake.

use zeroize::Zeroize;

/// Length of the derived key in bytes (AES-256).
pub const SERIAL_KEY_LEN: usize = 32;

/// Symmetric key derived from a device serial.
#[derive(Clone)]
pub struct SerialKey {
    key: [u8; SERIAL_KEY_LEN],
}

impl SerialKey {
    /// Create a key from raw bytes
    pub fn from_bytes(key: [u8; SERIAL_KEY_LEN]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; SERIAL_KEY_LEN] {
        &self.key
    }
}

impl Drop for SerialKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for SerialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SerialKey(..)")
    }
}

/// Derive the registration key from a device serial.
pub fn derive_serial_key(serial: &str) -> SerialKey {
    let mut doubled = String::with_capacity(serial.len() * 2);
    doubled.push_str(serial);
    doubled.push_str(serial);

    let bytes = doubled.as_bytes();
    let take = bytes.len().min(SERIAL_KEY_LEN);

    let mut key = [0u8; SERIAL_KEY_LEN];
    key[..take].copy_from_slice(&bytes[..take]);
    doubled.zeroize();

    SerialKey { key }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_always_32_bytes() {
        for serial in ["", "1", "1234", "12340000000001", &"9".repeat(100)] {
            assert_eq!(derive_serial_key(serial).as_bytes().len(), SERIAL_KEY_LEN);
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_serial_key("12340000000001");
        let b = derive_serial_key("12340000000001");
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn serial_is_doubled_then_truncated() {
        let key = derive_serial_key("12340000000001");
        // 14 chars doubled = 28 bytes, followed by 4 zero bytes
        let mut expected = [0u8; 32];
        expected[..28].copy_from_slice(b"1234000000000112340000000001");
        assert_eq!(key.as_bytes(), &expected);

        let long = derive_serial_key("ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        assert_eq!(long.as_bytes(), b"ABCDEFGHIJKLMNOPQRSTUVWXYZABCDEF");
    }

    #[test]
    fn short_serial_is_zero_padded() {
        let key = derive_serial_key("ab");
        assert_eq!(&key.as_bytes()[..4], b"abab");
        assert!(key.as_bytes()[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn changing_one_character_changes_key() {
        let base = derive_serial_key("12340000000001");
        for variant in ["12340000000002", "02340000000001", "12340000100001"] {
            assert_ne!(base.as_bytes(), derive_serial_key(variant).as_bytes());
        }
    }

    #[test]
    fn multibyte_serial_is_truncated_by_bytes() {
        // 'é' is two bytes in UTF-8; the key takes raw bytes, not characters
        let serial = "é".repeat(20);
        let key = derive_serial_key(&serial);
        assert_eq!(key.as_bytes(), &serial.as_bytes()[..32]);
    }
}
