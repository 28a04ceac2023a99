//! Per-request challenge headers for ERP calls.
//!
//! Every signed call carries a fresh random nonce in clear text
//! (`ArbitraryCode`) and the same nonce encrypted with the device's RSA public
//! key (`EncArbitraryCode`). The ERP decrypts the latter with its private key
//! and compares.

use crate::crypto::rsa_key::encrypt_pkcs1v15_base64;
use crate::crypto::RsaKeyValue;
use crate::device::DEFAULT_GENERATION_VERSION;
use crate::storage::Store;
use crate::{ErpLinkError, Result};
use uuid::Uuid;

pub const HEADER_GENERATION_VERSION: &str = "GenerationVersion";
pub const HEADER_INTEGRATION_ID: &str = "IntegrationID";
pub const HEADER_ARBITRARY_CODE: &str = "ArbitraryCode";
pub const HEADER_ENC_ARBITRARY_CODE: &str = "EncArbitraryCode";

/// The mandatory header set of one ERP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub generation_version: String,
    pub integration_id: u32,
    pub arbitrary_code: String,
    pub enc_arbitrary_code: String,
    /// `Bearer <token>`, when the call is authenticated.
    pub authorization: Option<String>,
}

impl SignedHeaders {
    /// Header name/value pairs in wire form.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (HEADER_GENERATION_VERSION, self.generation_version.clone()),
            (HEADER_INTEGRATION_ID, self.integration_id.to_string()),
            (HEADER_ARBITRARY_CODE, self.arbitrary_code.clone()),
            (HEADER_ENC_ARBITRARY_CODE, self.enc_arbitrary_code.clone()),
        ];
        if let Some(authorization) = &self.authorization {
            pairs.push(("Authorization", authorization.clone()));
        }
        pairs
    }

    /// Attach the headers to an outgoing request.
    pub fn apply(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in self.pairs() {
            builder = builder.header(name, value);
        }
        builder
    }
}

/// Builds [`SignedHeaders`] from the device records in the store.
#[derive(Clone)]
pub struct RequestSigner {
    store: Store,
}

impl RequestSigner {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Build the header set for one request.
    ///
    /// Never reuse the result for a second request; each call draws a new
    /// nonce.
    pub fn build_headers(
        &self,
        tenant_id: &str,
        integration_id: u32,
        token: Option<&str>,
    ) -> Result<SignedHeaders> {
        let device = self
            .store
            .find_device(tenant_id, integration_id)?
            .filter(|device| device.is_registered)
            .ok_or_else(|| ErpLinkError::DeviceNotRegistered {
                tenant_id: tenant_id.to_string(),
                integration_id,
            })?;

        let arbitrary_code = Uuid::new_v4().to_string();
        let public_key = RsaKeyValue::from_xml(&device.public_key_xml)?.to_public_key()?;
        let enc_arbitrary_code = encrypt_pkcs1v15_base64(&public_key, arbitrary_code.as_bytes())?;

        let generation_version = if device.generation_version.trim().is_empty() {
            DEFAULT_GENERATION_VERSION.to_string()
        } else {
            device.generation_version
        };

        Ok(SignedHeaders {
            generation_version,
            integration_id,
            arbitrary_code,
            enc_arbitrary_code,
            authorization: token.map(|t| format!("Bearer {}", t)),
        })
    }
}
