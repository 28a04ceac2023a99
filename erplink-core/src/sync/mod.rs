//! ERP reconciliation
//!
//! Mirrors ERP collections into the local store:
//! - Table-driven alias resolution of ERP field names per scope
//! - Full-record upserts keyed by natural key (ERP wins)
//! - An append-only log with one sync run per attempt
//! - Periodic fan-out over configured tenants

pub mod engine;
pub mod mapping;
pub mod models;
pub mod scheduler;

pub use engine::Reconciler;
pub use mapping::{MappedRecord, ScopeSchema};
pub use models::{FullSyncReport, SyncReport, SyncRun, SyncRunStatus, SyncScope};
pub use scheduler::SyncScheduler;
