//! Device pairing with the ERP.
//!
//! A device is identified by `(tenant_id, integration_id)`. Pairing exchanges
//! the device serial for the ERP's RSA public key, which every later request
//! uses to encrypt its challenge nonce.

use crate::crypto::{
    decrypt_cbc_base64, derive_serial_key, encrypt_cbc_base64, generate_iv, CryptoError,
    RsaKeyValue,
};
use crate::erp::models::RegisterRequest;
use crate::erp::ErpClient;
use crate::storage::Store;
use crate::{ErpLinkError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Protocol generation sent when the ERP has not reported one.
pub const DEFAULT_GENERATION_VERSION: &str = "101";

/// A paired (or previously paired) integration endpoint.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub tenant_id: String,
    pub integration_id: u32,
    /// Source of the handshake key; never serialized.
    #[serde(skip_serializing)]
    pub serial: String,
    pub title: Option<String>,
    /// Vendor `RSAKeyValue` XML recovered from the handshake.
    pub public_key_xml: String,
    pub cypher_from_server: Option<String>,
    pub iv_from_server: Option<String>,
    pub is_registered: bool,
    pub generation_version: String,
    pub lock_number: Option<String>,
    pub last_registered_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Device {
    /// Parsed RSA public key components.
    pub fn public_key(&self) -> Result<RsaKeyValue> {
        Ok(RsaKeyValue::from_xml(&self.public_key_xml)?)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("tenant_id", &self.tenant_id)
            .field("integration_id", &self.integration_id)
            .field("serial", &"..")
            .field("title", &self.title)
            .field("is_registered", &self.is_registered)
            .field("generation_version", &self.generation_version)
            .field("lock_number", &self.lock_number)
            .field("last_registered_at", &self.last_registered_at)
            .finish_non_exhaustive()
    }
}

/// Integration id embedded in a device serial: its first four digits.
pub fn integration_id_from_serial(serial: &str) -> Result<u32> {
    let prefix = serial
        .get(..4)
        .filter(|p| p.chars().all(|c| c.is_ascii_digit()))
        .ok_or_else(|| {
            ErpLinkError::InvalidInput(
                "Device serial must start with a four-digit integration id".to_string(),
            )
        })?;

    prefix
        .parse()
        .map_err(|e| ErpLinkError::InvalidInput(format!("Invalid integration id: {}", e)))
}

/// Performs the registration handshake and persists the resulting device.
pub struct DeviceRegistrar {
    client: Arc<ErpClient>,
    store: Store,
    default_generation_version: String,
}

impl DeviceRegistrar {
    pub fn new(client: Arc<ErpClient>, store: Store, default_generation_version: &str) -> Self {
        Self {
            client,
            store,
            default_generation_version: default_generation_version.to_string(),
        }
    }

    /// Pair `serial` with the ERP for `tenant_id`.
    ///
    /// Re-registering an existing `(tenant_id, integration_id)` overwrites the
    /// stored key material. On any handshake failure nothing is written.
    pub async fn register_device(
        &self,
        tenant_id: &str,
        serial: &str,
        integration_id_override: Option<u32>,
    ) -> Result<Device> {
        if tenant_id.trim().is_empty() {
            return Err(ErpLinkError::InvalidInput("Tenant id is required".to_string()));
        }
        if serial.trim().is_empty() {
            return Err(ErpLinkError::InvalidInput("Device serial is required".to_string()));
        }
        // The key is derived from the exact serial bytes
        if serial.trim() != serial {
            return Err(ErpLinkError::InvalidInput(
                "Device serial must not have surrounding whitespace".to_string(),
            ));
        }

        let integration_id = match integration_id_override {
            Some(id) => id,
            None => integration_id_from_serial(serial)?,
        };

        let (public_key_xml, cypher, iv) = self
            .handshake(serial, integration_id)
            .await
            .map_err(|e| {
                warn!(tenant_id, integration_id, error = %e, "Device registration failed");
                ErpLinkError::RegistrationFailed(Box::new(e))
            })?;

        let now = chrono::Utc::now().timestamp();
        let device = self.store.upsert_device(&Device {
            tenant_id: tenant_id.to_string(),
            integration_id,
            serial: serial.to_string(),
            title: None,
            public_key_xml,
            cypher_from_server: Some(cypher),
            iv_from_server: Some(iv),
            is_registered: true,
            generation_version: self.default_generation_version.clone(),
            lock_number: None,
            last_registered_at: Some(now),
            created_at: now,
            updated_at: now,
        })?;

        info!(tenant_id, integration_id, "Device registered");
        Ok(device)
    }

    /// Query the ERP's generation version and lock number and store them on
    /// the device.
    pub async fn refresh_generation_info(&self, tenant_id: &str, integration_id: u32) -> Result<Device> {
        let info = self.client.get_generation_info().await?;
        let now = chrono::Utc::now().timestamp();

        let updated = self.store.update_generation_info(
            tenant_id,
            integration_id,
            &info.generation_version,
            info.lock_number.as_deref(),
            now,
        )?;
        if !updated {
            return Err(ErpLinkError::DeviceNotRegistered {
                tenant_id: tenant_id.to_string(),
                integration_id,
            });
        }

        info!(
            tenant_id,
            integration_id,
            generation_version = %info.generation_version,
            "Generation info refreshed"
        );

        self.store
            .find_device(tenant_id, integration_id)?
            .ok_or_else(|| ErpLinkError::DeviceNotRegistered {
                tenant_id: tenant_id.to_string(),
                integration_id,
            })
    }

    /// Returns the recovered key XML and the server's `(Cypher, IV)` pair.
    async fn handshake(&self, serial: &str, integration_id: u32) -> Result<(String, String, String)> {
        let key = derive_serial_key(serial);
        let iv = generate_iv();
        let cypher = encrypt_cbc_base64(&key, &iv, integration_id.to_string().as_bytes())?;

        let response = self
            .client
            .register(&RegisterRequest {
                cypher,
                iv: STANDARD.encode(iv),
                integration_id,
            })
            .await?;

        // The reply is encrypted under the server's IV, not ours
        let server_iv = STANDARD.decode(response.iv.trim()).map_err(CryptoError::from)?;
        let plaintext = decrypt_cbc_base64(&key, &server_iv, &response.cypher)?;
        let public_key_xml = String::from_utf8(plaintext)
            .map_err(|e| CryptoError::DecryptionFailed(format!("Key is not UTF-8: {}", e)))?;

        RsaKeyValue::from_xml(&public_key_xml)?;

        Ok((public_key_xml, response.cypher, response.iv))
    }
}
