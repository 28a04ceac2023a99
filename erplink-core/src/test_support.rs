//! Shared fixtures for unit tests: a device key pair, seeded devices and an
//! in-process mock ERP.

use crate::crypto::RsaKeyValue;
use crate::device::{Device, DEFAULT_GENERATION_VERSION};
use crate::erp::{ErpClient, RequestSigner};
use crate::storage::Store;
use base64::{engine::general_purpose::STANDARD, Engine};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

pub(crate) const TENANT: &str = "tenant-a";
pub(crate) const INTEGRATION_ID: u32 = 1234;

/// Device key pair shared by every test; generated once per test binary.
pub(crate) fn device_key() -> &'static (RsaPrivateKey, String) {
    static KEY: OnceLock<(RsaPrivateKey, String)> = OnceLock::new();
    KEY.get_or_init(|| {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let xml = RsaKeyValue {
            modulus: private.n().to_bytes_be(),
            exponent: private.e().to_bytes_be(),
        }
        .to_xml();
        (private, xml)
    })
}

/// Insert a registered device using the shared key pair.
pub(crate) fn seed_device(store: &Store, tenant_id: &str, integration_id: u32) -> Device {
    let now = chrono::Utc::now().timestamp();
    store
        .upsert_device(&Device {
            tenant_id: tenant_id.to_string(),
            integration_id,
            serial: format!("{:04}0000000001", integration_id),
            title: None,
            public_key_xml: device_key().1.clone(),
            cypher_from_server: None,
            iv_from_server: None,
            is_registered: true,
            generation_version: DEFAULT_GENERATION_VERSION.to_string(),
            lock_number: None,
            last_registered_at: Some(now),
            created_at: now,
            updated_at: now,
        })
        .unwrap()
}

/// Recover the plaintext nonce from an `EncArbitraryCode` header value.
pub(crate) fn decrypt_challenge(enc_b64: &str) -> String {
    let ciphertext = STANDARD.decode(enc_b64).unwrap();
    let plaintext = device_key().0.decrypt(Pkcs1v15Encrypt, &ciphertext).unwrap();
    String::from_utf8(plaintext).unwrap()
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub(crate) async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub(crate) fn client(base_url: &str, store: &Store) -> Arc<ErpClient> {
    Arc::new(
        ErpClient::new(
            base_url,
            Duration::from_secs(5),
            RequestSigner::new(store.clone()),
        )
        .unwrap(),
    )
}
