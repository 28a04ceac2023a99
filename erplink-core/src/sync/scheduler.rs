//! Periodic reconciliation of configured targets.

use crate::config::{ErpLinkConfig, SyncTarget};
use crate::session::TokenProvider;
use crate::sync::engine::Reconciler;
use crate::sync::models::{FullSyncReport, SyncScope};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

/// Runs the configured scopes for every target on a fixed interval.
pub struct SyncScheduler {
    reconciler: Arc<Reconciler>,
    tokens: Arc<dyn TokenProvider>,
    targets: Vec<SyncTarget>,
    scopes: Vec<SyncScope>,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(
        reconciler: Arc<Reconciler>,
        tokens: Arc<dyn TokenProvider>,
        targets: Vec<SyncTarget>,
        scopes: Vec<SyncScope>,
        interval: Duration,
    ) -> Self {
        Self {
            reconciler,
            tokens,
            targets,
            scopes,
            interval,
        }
    }

    pub fn from_config(
        config: &ErpLinkConfig,
        reconciler: Arc<Reconciler>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self::new(
            reconciler,
            tokens,
            config.targets.clone(),
            config.scheduled_scopes.clone(),
            Duration::from_secs(config.sync_interval_secs),
        )
    }

    /// One pass over all targets, in order. Scopes of a target fan out.
    ///
    /// A target whose token cannot be resolved is skipped; the others still
    /// run.
    pub async fn run_once(&self) -> Vec<(SyncTarget, Result<FullSyncReport>)> {
        let mut outcomes = Vec::with_capacity(self.targets.len());

        for target in &self.targets {
            let token = match self
                .tokens
                .token(&target.tenant_id, target.integration_id, None)
                .await
            {
                Ok(token) => token,
                Err(e) => {
                    error!(
                        tenant_id = %target.tenant_id,
                        integration_id = target.integration_id,
                        error = %e,
                        "No ERP token for scheduled sync"
                    );
                    outcomes.push((target.clone(), Err(e)));
                    continue;
                }
            };

            let report = self
                .reconciler
                .sync_many(&self.scopes, &target.tenant_id, target.integration_id, &token)
                .await;

            for (scope, e) in &report.failed {
                warn!(tenant_id = %target.tenant_id, %scope, error = %e, "Scheduled sync failed");
            }
            info!(
                tenant_id = %target.tenant_id,
                records = report.total(),
                failed = report.failed.len(),
                "Scheduled sync pass finished"
            );

            outcomes.push((target.clone(), Ok(report)));
        }

        outcomes
    }

    /// Run immediately, then every interval, until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // The first tick completes immediately
                interval.tick().await;
                self.run_once().await;
            }
        })
    }
}
