//! Storage model types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A locally mirrored ERP record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub tenant_id: String,
    pub natural_key: String,
    /// Full reconciled field set, local (camelCase) field names.
    pub payload: Value,
    pub last_synced_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// An ERP bearer token cached for a tenant/integration principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub tenant_id: String,
    pub integration_id: u32,
    /// Service account username or application user id.
    pub principal: String,
    pub token: String,
    pub expires_at: i64,
}

impl CachedToken {
    /// Whether the token remains valid for at least `margin_secs` after `now`.
    pub fn valid_for(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at > now + margin_secs
    }
}
