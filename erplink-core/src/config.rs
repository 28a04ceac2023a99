//! ERP link configuration, loaded from TOML.

use crate::sync::models::SyncScope;
use crate::{ErpLinkError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A tenant/integration pair reconciled by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTarget {
    pub tenant_id: String,
    pub integration_id: u32,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErpLinkConfig {
    pub erp_url: String,
    pub request_timeout_secs: u64,
    pub default_generation_version: String,
    pub database_path: PathBuf,
    pub sync_interval_secs: u64,
    pub service_username: Option<String>,
    /// Read from the file but never written back out.
    #[serde(skip_serializing)]
    pub service_password: Option<String>,
    pub targets: Vec<SyncTarget>,
    pub scheduled_scopes: Vec<SyncScope>,
}

impl Default for ErpLinkConfig {
    fn default() -> Self {
        Self {
            erp_url: "http://localhost:7373/api".to_string(),
            request_timeout_secs: 15,
            default_generation_version: crate::device::DEFAULT_GENERATION_VERSION.to_string(),
            database_path: PathBuf::from("erplink.db"),
            sync_interval_secs: 15 * 60,
            service_username: None,
            service_password: None,
            targets: Vec::new(),
            scheduled_scopes: SyncScope::SCHEDULED.to_vec(),
        }
    }
}

impl std::fmt::Debug for ErpLinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErpLinkConfig")
            .field("erp_url", &self.erp_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("default_generation_version", &self.default_generation_version)
            .field("database_path", &self.database_path)
            .field("sync_interval_secs", &self.sync_interval_secs)
            .field("service_username", &self.service_username)
            .field("service_password", &self.service_password.as_ref().map(|_| ".."))
            .field("targets", &self.targets)
            .field("scheduled_scopes", &self.scheduled_scopes)
            .finish()
    }
}

impl ErpLinkConfig {
    /// Parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ErpLinkError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(content).map_err(|e| ErpLinkError::Config(e.to_string()))?;
        config.normalize();
        Ok(config)
    }

    /// Trim whitespace and trailing slashes from the ERP URL.
    pub fn normalize(&mut self) {
        self.erp_url = self.erp_url.trim().trim_end_matches('/').to_string();
    }

    pub fn validate(&self) -> Result<()> {
        if self.erp_url.trim().is_empty() {
            return Err(ErpLinkError::Config("erp_url must not be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ErpLinkError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.sync_interval_secs == 0 {
            return Err(ErpLinkError::Config(
                "sync_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
