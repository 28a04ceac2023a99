//! Sync data models: reconciliation scopes, run log entries and reports.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// ERP collection mirrored by the reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncScope {
    Items,
    Inventories,
    PriceNotes,
    Customers,
    Invoices,
    Quotations,
}

impl SyncScope {
    /// Every scope, in table-creation order.
    pub const ALL: [SyncScope; 6] = [
        Self::Items,
        Self::Inventories,
        Self::PriceNotes,
        Self::Customers,
        Self::Invoices,
        Self::Quotations,
    ];

    /// Scopes pulled by a scheduled full sync.
    pub const SCHEDULED: [SyncScope; 4] = [
        Self::Items,
        Self::Inventories,
        Self::PriceNotes,
        Self::Customers,
    ];

    /// Convert scope to its string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Items => "items",
            Self::Inventories => "inventories",
            Self::PriceNotes => "priceNotes",
            Self::Customers => "customers",
            Self::Invoices => "invoices",
            Self::Quotations => "quotations",
        }
    }

    /// Parse a scope from its string representation.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scope| scope.as_str() == s)
    }

    /// Local table holding the mirrored records of this scope.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Items => "items",
            Self::Inventories => "inventories",
            Self::PriceNotes => "price_note_items",
            Self::Customers => "customers",
            Self::Invoices => "invoices",
            Self::Quotations => "quotations",
        }
    }
}

impl std::fmt::Display for SyncScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for SyncScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            let known: Vec<&str> = Self::ALL.iter().map(|scope| scope.as_str()).collect();
            format!("unknown scope '{}', expected one of: {}", s, known.join(", "))
        })
    }
}

/// Outcome of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Running,
    Ok,
    Error,
}

impl SyncRunStatus {
    /// Convert status to its string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }

    /// Parse a status from its string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "ok" => Some(Self::Ok),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One reconciliation attempt for one scope of one tenant.
///
/// Written once when the pull starts and finalized exactly once; the log is
/// append-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub run_id: Uuid,
    pub tenant_id: String,
    pub scope: SyncScope,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub status: SyncRunStatus,
    /// `{"count": n}` on success.
    pub details: Option<Value>,
    /// `{"kind": ..., "message": ...}` on failure, plus `status`/`body` for ERP errors.
    pub error: Option<Value>,
}

/// Result of a successful scope sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub scope: SyncScope,
    /// Records upserted.
    pub count: usize,
    /// The raw collection as fetched, for callers that compose on it.
    #[serde(skip)]
    pub records: Vec<Value>,
}

/// Per-scope outcomes of a fan-out sync.
#[derive(Debug, Default)]
pub struct FullSyncReport {
    pub succeeded: Vec<SyncReport>,
    pub failed: Vec<(SyncScope, crate::ErpLinkError)>,
}

impl FullSyncReport {
    /// Records upserted by the given scope, if it succeeded.
    pub fn count(&self, scope: SyncScope) -> Option<usize> {
        self.succeeded
            .iter()
            .find(|report| report.scope == scope)
            .map(|report| report.count)
    }

    /// Total records upserted across all successful scopes.
    pub fn total(&self) -> usize {
        self.succeeded.iter().map(|report| report.count).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
