//! Reconciliation engine: pulls ERP collections into the local store.

use crate::erp::ErpClient;
use crate::storage::Store;
use crate::sync::mapping;
use crate::sync::models::{FullSyncReport, SyncReport, SyncRunStatus, SyncScope};
use crate::{ErpLinkError, Result};
use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Mirrors ERP collections into the store and logs every attempt as a
/// sync run.
///
/// The ERP is authoritative: each run replaces every record it sees in full,
/// and local edits are overwritten. Records missing from a pull are kept.
pub struct Reconciler {
    client: Arc<ErpClient>,
    store: Store,
}

impl Reconciler {
    pub fn new(client: Arc<ErpClient>, store: Store) -> Self {
        Self { client, store }
    }

    /// Pull one scope for a tenant.
    ///
    /// Exactly one sync run is written per call. On failure the run is
    /// finalized with the captured error before it is returned, wrapped in
    /// [`ErpLinkError::Sync`].
    pub async fn sync(
        &self,
        scope: SyncScope,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
    ) -> Result<SyncReport> {
        let run = self
            .store
            .start_sync_run(tenant_id, scope, chrono::Utc::now().timestamp())
            .map_err(|e| sync_error(scope, e.into()))?;
        debug!(%scope, tenant_id, run_id = %run.run_id, "Sync run started");

        let outcome = match self.pull(scope, tenant_id, integration_id, token).await {
            Ok(records) => self
                .store
                .finish_sync_run(
                    run.run_id,
                    SyncRunStatus::Ok,
                    Some(&json!({ "count": records.len() })),
                    None,
                    chrono::Utc::now().timestamp(),
                )
                .map(|()| records)
                .map_err(ErpLinkError::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(records) => {
                let count = records.len();
                info!(%scope, tenant_id, count, "Sync completed");
                Ok(SyncReport {
                    run_id: run.run_id,
                    scope,
                    count,
                    records,
                })
            }
            Err(e) => {
                // Also reached when recording success failed, so the run is not left running
                if let Err(log_err) = self.store.finish_sync_run(
                    run.run_id,
                    SyncRunStatus::Error,
                    None,
                    Some(&error_payload(&e)),
                    chrono::Utc::now().timestamp(),
                ) {
                    error!(%scope, tenant_id, run_id = %run.run_id, error = %log_err, "Failed to record sync failure");
                }

                warn!(%scope, tenant_id, error = %e, "Sync failed");
                Err(sync_error(scope, e))
            }
        }
    }

    /// Pull several scopes concurrently.
    ///
    /// Scopes are independent: a failure in one neither cancels nor rolls
    /// back the others.
    pub async fn sync_many(
        &self,
        scopes: &[SyncScope],
        tenant_id: &str,
        integration_id: u32,
        token: &str,
    ) -> FullSyncReport {
        let outcomes = join_all(scopes.iter().map(|&scope| async move {
            (scope, self.sync(scope, tenant_id, integration_id, token).await)
        }))
        .await;

        let mut report = FullSyncReport::default();
        for (scope, outcome) in outcomes {
            match outcome {
                Ok(scope_report) => report.succeeded.push(scope_report),
                Err(e) => report.failed.push((scope, e)),
            }
        }
        report
    }

    /// Fetch, map, then upsert record by record. Returns the raw collection.
    async fn pull(
        &self,
        scope: SyncScope,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
    ) -> Result<Vec<Value>> {
        let records = self
            .client
            .fetch_collection(scope, tenant_id, integration_id, token)
            .await?;
        let mapped = mapping::schema(scope).map_collection(&records)?;

        let synced_at = chrono::Utc::now().timestamp();
        for record in &mapped {
            self.store.upsert_record(
                scope,
                tenant_id,
                &record.natural_key,
                &record.payload,
                synced_at,
            )?;
        }

        Ok(records)
    }
}

fn sync_error(scope: SyncScope, source: ErpLinkError) -> ErpLinkError {
    ErpLinkError::Sync {
        scope,
        source: Box::new(source),
    }
}

/// JSON stored on a failed sync run.
fn error_payload(err: &ErpLinkError) -> Value {
    let mut payload = json!({
        "kind": err.kind(),
        "message": err.to_string(),
    });
    if let ErpLinkError::Erp { status, body } = err {
        payload["status"] = json!(status);
        payload["body"] = json!(body);
    }
    payload
}
