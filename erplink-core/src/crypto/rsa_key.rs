//! Vendor `RSAKeyValue` XML to SubjectPublicKeyInfo conversion.
//!
//! The ERP hands out device public keys in the .NET XML form:
//!
//! ```text
//! <RSAKeyValue><Modulus>base64</Modulus><Exponent>base64</Exponent></RSAKeyValue>
//! ```
//!
//! The request signer needs a standard public key, so the modulus and
//! exponent are re-encoded as a DER SubjectPublicKeyInfo and parsed with the
//! `rsa` crate.

use crate::crypto::{CryptoError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use pkcs8::der::asn1::{BitString, UintRef};
use pkcs8::der::pem::{self, LineEnding};
use pkcs8::der::{Any, AnyRef, Encode};
use pkcs8::spki::{AlgorithmIdentifierOwned, ObjectIdentifier, SubjectPublicKeyInfoOwned};
use rsa::pkcs1;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use serde::Deserialize;

/// rsaEncryption (PKCS #1)
const OID_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

#[derive(Deserialize)]
#[serde(rename = "RSAKeyValue")]
struct RsaKeyValueXml {
    #[serde(rename = "Modulus")]
    modulus: String,
    #[serde(rename = "Exponent")]
    exponent: String,
}

/// Raw big-endian RSA public key components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaKeyValue {
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}

impl RsaKeyValue {
    /// Parse the vendor XML form.
    ///
    /// Elements other than `Modulus` and `Exponent` (such as the private
    /// parameters of a full key export) are ignored.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let parsed: RsaKeyValueXml = quick_xml::de::from_str(xml.trim())
            .map_err(|e| CryptoError::KeyFormat(format!("Invalid RSAKeyValue XML: {}", e)))?;

        let modulus = decode_component("Modulus", &parsed.modulus)?;
        let exponent = decode_component("Exponent", &parsed.exponent)?;

        Ok(Self { modulus, exponent })
    }

    /// Render the vendor XML form.
    pub fn to_xml(&self) -> String {
        format!(
            "<RSAKeyValue><Modulus>{}</Modulus><Exponent>{}</Exponent></RSAKeyValue>",
            STANDARD.encode(&self.modulus),
            STANDARD.encode(&self.exponent)
        )
    }

    /// DER-encoded SubjectPublicKeyInfo.
    ///
    /// ```text
    /// SEQUENCE {
    ///   SEQUENCE { OID rsaEncryption, NULL }
    ///   BIT STRING { SEQUENCE { INTEGER modulus, INTEGER exponent } }
    /// }
    /// ```
    ///
    /// Integers are canonical: redundant leading zeros are dropped and a zero
    /// byte is prepended when the high bit is set.
    pub fn to_spki_der(&self) -> Result<Vec<u8>> {
        let rsa_public_key = pkcs1::RsaPublicKey {
            modulus: UintRef::new(&self.modulus).map_err(key_format)?,
            public_exponent: UintRef::new(&self.exponent).map_err(key_format)?,
        }
        .to_der()
        .map_err(key_format)?;

        let spki = SubjectPublicKeyInfoOwned {
            algorithm: AlgorithmIdentifierOwned {
                oid: OID_RSA_ENCRYPTION,
                parameters: Some(Any::from(AnyRef::NULL)),
            },
            subject_public_key: BitString::from_bytes(&rsa_public_key).map_err(key_format)?,
        };
        spki.to_der().map_err(key_format)
    }

    /// PEM armor around the SubjectPublicKeyInfo, 64 columns per line.
    pub fn to_spki_pem(&self) -> Result<String> {
        pem::encode_string("PUBLIC KEY", LineEnding::LF, &self.to_spki_der()?)
            .map_err(|e| CryptoError::KeyFormat(format!("Cannot armor RSA public key: {}", e)))
    }

    /// Parse into a usable RSA public key.
    pub fn to_public_key(&self) -> Result<RsaPublicKey> {
        RsaPublicKey::from_public_key_der(&self.to_spki_der()?)
            .map_err(|e| CryptoError::KeyFormat(format!("Unusable RSA public key: {}", e)))
    }
}

/// Encrypt `plaintext` with PKCS#1 v1.5 padding and return it as Base64.
///
/// The ERP verifies the per-request challenge with this padding scheme; OAEP
/// is not accepted.
pub fn encrypt_pkcs1v15_base64(key: &RsaPublicKey, plaintext: &[u8]) -> Result<String> {
    let mut rng = rand::thread_rng();
    let ciphertext = key
        .encrypt(&mut rng, Pkcs1v15Encrypt, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    Ok(STANDARD.encode(ciphertext))
}

fn key_format(e: pkcs8::der::Error) -> CryptoError {
    CryptoError::KeyFormat(format!("Cannot encode RSA public key: {}", e))
}

fn decode_component(name: &str, text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(CryptoError::KeyFormat(format!("Empty {} element", name)));
    }
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| CryptoError::KeyFormat(format!("Invalid {} encoding: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;
    use rsa::traits::PublicKeyParts;
    use rsa::RsaPrivateKey;

    fn random_modulus(bytes: usize) -> Vec<u8> {
        let mut modulus = vec![0u8; bytes];
        rand::thread_rng().fill_bytes(&mut modulus);
        modulus[0] |= 0x80;
        modulus[bytes - 1] |= 0x01;
        modulus
    }

    #[test]
    fn spki_roundtrip_through_standard_parser() {
        let key = RsaKeyValue {
            modulus: random_modulus(256),
            exponent: vec![0x01, 0x00, 0x01],
        };

        let parsed = key.to_public_key().unwrap();
        assert_eq!(parsed.n().to_bytes_be(), key.modulus);
        assert_eq!(parsed.e().to_bytes_be(), key.exponent);
    }

    #[test]
    fn xml_roundtrip_through_standard_parser() {
        let key = RsaKeyValue {
            modulus: random_modulus(512),
            exponent: vec![0x01, 0x00, 0x01],
        };

        let reparsed = RsaKeyValue::from_xml(&key.to_xml()).unwrap();
        assert_eq!(reparsed, key);

        let public = reparsed.to_public_key().unwrap();
        assert_eq!(public.n().to_bytes_be(), key.modulus);
    }

    #[test]
    fn spki_encoding_is_deterministic() {
        let key = RsaKeyValue {
            modulus: random_modulus(256),
            exponent: vec![0x01, 0x00, 0x01],
        };
        assert_eq!(key.to_spki_der().unwrap(), key.to_spki_der().unwrap());
        assert_eq!(key.to_spki_pem().unwrap(), key.to_spki_pem().unwrap());
    }

    #[test]
    fn spki_layout_for_2048_bit_key() {
        let key = RsaKeyValue {
            modulus: random_modulus(256),
            exponent: vec![0x01, 0x00, 0x01],
        };
        let der = key.to_spki_der().unwrap();

        // 30 82 01 22 | 30 0d 06 09 <oid> 05 00 | 03 82 01 0f 00 | 30 82 01 0a 02 82 01 01 00 ...
        assert_eq!(der.len(), 294);
        assert_eq!(&der[..4], &[0x30, 0x82, 0x01, 0x22]);
        assert_eq!(&der[4..6], &[0x30, 0x0d]);
        assert_eq!(&der[17..19], &[0x05, 0x00]);
        assert_eq!(&der[19..24], &[0x03, 0x82, 0x01, 0x0f, 0x00]);
        assert_eq!(&der[24..33], &[0x30, 0x82, 0x01, 0x0a, 0x02, 0x82, 0x01, 0x01, 0x00]);
    }

    #[test]
    fn generated_key_survives_xml_conversion() {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let public = private.to_public_key();
        let xml = RsaKeyValue {
            modulus: public.n().to_bytes_be(),
            exponent: public.e().to_bytes_be(),
        }
        .to_xml();

        let converted = RsaKeyValue::from_xml(&xml).unwrap().to_public_key().unwrap();
        assert_eq!(converted, public);

        let encrypted = encrypt_pkcs1v15_base64(&converted, b"challenge").unwrap();
        let decrypted = private
            .decrypt(Pkcs1v15Encrypt, &STANDARD.decode(encrypted).unwrap())
            .unwrap();
        assert_eq!(decrypted, b"challenge");
    }

    #[test]
    fn xml_with_whitespace_and_private_parts() {
        let modulus = random_modulus(128);
        let xml = format!(
            "<RSAKeyValue>\n  <Modulus>\n{}\n</Modulus>\n  <Exponent>AQAB</Exponent>\n  <P>AAAA</P>\n</RSAKeyValue>\n",
            STANDARD.encode(&modulus)
        );

        let key = RsaKeyValue::from_xml(&xml).unwrap();
        assert_eq!(key.modulus, modulus);
        assert_eq!(key.exponent, vec![0x01, 0x00, 0x01]);
    }

    #[test]
    fn missing_modulus_is_format_error() {
        let err = RsaKeyValue::from_xml("<RSAKeyValue><Exponent>AQAB</Exponent></RSAKeyValue>")
            .unwrap_err();
        assert!(matches!(err, CryptoError::KeyFormat(_)));
    }

    #[test]
    fn missing_exponent_is_format_error() {
        let err = RsaKeyValue::from_xml("<RSAKeyValue><Modulus>AQAB</Modulus></RSAKeyValue>")
            .unwrap_err();
        assert!(matches!(err, CryptoError::KeyFormat(_)));
    }

    #[test]
    fn garbage_is_format_error() {
        for input in ["", "not xml at all", "<Other><Modulus>AQAB</Modulus></Other>"] {
            assert!(matches!(
                RsaKeyValue::from_xml(input),
                Err(CryptoError::KeyFormat(_))
            ));
        }
    }

    #[test]
    fn invalid_base64_is_format_error() {
        let err = RsaKeyValue::from_xml(
            "<RSAKeyValue><Modulus>@@@</Modulus><Exponent>AQAB</Exponent></RSAKeyValue>",
        )
        .unwrap_err();
        assert!(matches!(err, CryptoError::KeyFormat(_)));
    }

    #[test]
    fn small_key_uses_short_form_and_sign_padding() {
        // Redundant leading zeros are dropped; 0xc1 needs a sign byte
        let key = RsaKeyValue {
            modulus: vec![0x00, 0x00, 0xc1],
            exponent: vec![0x01, 0x00, 0x01],
        };
        assert_eq!(
            key.to_spki_der().unwrap(),
            vec![
                0x30, 0x1d, // SubjectPublicKeyInfo
                0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01,
                0x05, 0x00, // rsaEncryption, NULL
                0x03, 0x0c, 0x00, // BIT STRING, no unused bits
                0x30, 0x09, 0x02, 0x02, 0x00, 0xc1, 0x02, 0x03, 0x01, 0x00, 0x01,
            ]
        );
    }

    #[test]
    fn leading_zeros_do_not_change_encoding() {
        let modulus = random_modulus(256);
        let mut padded = vec![0x00];
        padded.extend_from_slice(&modulus);

        let plain = RsaKeyValue {
            modulus,
            exponent: vec![0x01, 0x00, 0x01],
        };
        let padded = RsaKeyValue {
            modulus: padded,
            exponent: vec![0x00, 0x01, 0x00, 0x01],
        };
        assert_eq!(plain.to_spki_der().unwrap(), padded.to_spki_der().unwrap());
    }

    #[test]
    fn long_form_lengths_for_4096_bit_key() {
        let key = RsaKeyValue {
            modulus: random_modulus(512),
            exponent: vec![0x01, 0x00, 0x01],
        };
        let der = key.to_spki_der().unwrap();

        // Two-byte long-form lengths throughout: 512 + 1 sign byte = 0x0201
        assert_eq!(&der[..2], &[0x30, 0x82]);
        assert_eq!(usize::from(der[2]) << 8 | usize::from(der[3]), der.len() - 4);
        assert!(der
            .windows(4)
            .any(|w| w == [0x02, 0x82, 0x02, 0x01]));

        let parsed = key.to_public_key().unwrap();
        assert_eq!(parsed.n().to_bytes_be(), key.modulus);
    }

    #[test]
    fn pem_is_wrapped_at_64_columns() {
        let key = RsaKeyValue {
            modulus: random_modulus(256),
            exponent: vec![0x01, 0x00, 0x01],
        };
        let pem = key.to_spki_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----\n"));
        assert!(pem.ends_with("-----END PUBLIC KEY-----\n"));
        assert!(pem.lines().all(|l| l.len() <= 64));
    }
}
