//! ERP Link Core Library
//!
//! This library pairs a device with the ERP, signs every ERP request with the
//! paired key material, and mirrors ERP collections into a local SQLite
//! store:
//! - Serial-derived AES key and the one-time registration handshake
//! - Per-request challenge encryption with the device RSA public key
//! - Typed ERP HTTP client
//! - Idempotent reconciliation with a per-run audit log

pub mod config;
pub mod crypto;
pub mod device;
pub mod erp;
pub mod session;
pub mod storage;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{ErpLinkConfig, SyncTarget};
pub use device::{integration_id_from_serial, Device, DeviceRegistrar};
pub use erp::client::ErpClient;
pub use erp::signer::{RequestSigner, SignedHeaders};
pub use session::{ServiceSession, StaticToken, TokenProvider};
pub use storage::Store;
pub use sync::engine::Reconciler;
pub use sync::models::{FullSyncReport, SyncReport, SyncRun, SyncRunStatus, SyncScope};
pub use sync::scheduler::SyncScheduler;

use thiserror::Error;

/// Result type for ERP link operations
pub type Result<T> = std::result::Result<T, ErpLinkError>;

/// Storage-layer errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Sync run {0} is unknown or already finalized")]
    RunAlreadyFinalized(String),

    #[error("{0}")]
    Other(String),
}

/// General error type for ERP link operations
#[derive(Error, Debug)]
pub enum ErpLinkError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Device registration failed: {0}")]
    RegistrationFailed(#[source] Box<ErpLinkError>),

    #[error("Device not registered for tenant {tenant_id}, integration {integration_id}")]
    DeviceNotRegistered {
        tenant_id: String,
        integration_id: u32,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("ERP error {status}: {body}")]
    Erp { status: u16, body: String },

    #[error("Invalid ERP response: {0}")]
    InvalidResponse(String),

    #[error("Sync of {scope} failed: {source}")]
    Sync {
        scope: SyncScope,
        #[source]
        source: Box<ErpLinkError>,
    },

    #[error("No ERP token available: {0}")]
    TokenUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ErpLinkError {
    /// Short machine-readable name of the error kind, stored on failed sync runs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Crypto(crypto::CryptoError::KeyFormat(_)) => "format",
            Self::Crypto(_) => "crypto",
            Self::Database(_) => "database",
            Self::RegistrationFailed(_) => "registration_failed",
            Self::DeviceNotRegistered { .. } => "device_not_registered",
            Self::Transport(_) => "transport",
            Self::Erp { .. } => "erp",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Sync { .. } => "sync",
            Self::TokenUnavailable(_) => "token_unavailable",
            Self::Config(_) => "config",
            Self::InvalidInput(_) => "invalid_input",
        }
    }
}
