//! Depleted/expired client reclamation.
//!
//! A run reads the operator's "delete after N days" threshold, selects the
//! enabled clients that either used up their traffic quota or expired more
//! than N days ago, and removes them one by one:
//!
//! 1. Read the threshold fresh from the settings store (0 disables the job)
//! 2. Compute the expiry cutoff, `now - N days`
//! 3. Select eligible clients from the usage store in a single query
//! 4. Remove each client and regenerate the proxy config
//!
//! A failure for one client is logged and counted but never stops the run.
//! Clients that could not be removed stay in the store and are matched again
//! on the next cycle.
//!
//! Every run that deletes holds the `auto_delete` lease in the store, so two
//! processes sharing a database (a `serve` and a `run-once`, or two replicas)
//! never remove clients at the same time. The loser reports
//! [`RunStatus::Skipped`].

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    config::AutoDeleteJobConfig,
    db::{AUTO_DELETE_LEASE, ClientRepo, DbError, DbPool, JobLeaseRepo, SettingRepo},
    models::{DepletionReason, expiry_limit_ms},
    observability::metrics,
    services::{ClientRemover, ConfigRegenerator},
};

/// A client selected for removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleClient {
    pub inbound_id: i64,
    pub email: String,
    pub reason: DepletionReason,
}

/// Result of one eligibility scan.
#[derive(Debug, Clone, Default)]
pub struct EligibleSet {
    /// Threshold in days the scan ran with (0 = disabled).
    pub threshold_days: i64,
    /// Expiry cutoff in epoch millis, `None` when the job is disabled.
    pub expiry_limit_ms: Option<i64>,
    /// Eligible clients, ordered by inbound id then email.
    pub clients: Vec<EligibleClient>,
}

impl EligibleSet {
    pub fn is_disabled(&self) -> bool {
        self.threshold_days == 0
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Failed to read auto-delete threshold: {0}")]
    Threshold(#[source] DbError),

    #[error("Failed to query client usage: {0}")]
    Query(#[source] DbError),
}

/// Compute the set of clients eligible for deletion at `now`.
///
/// The threshold is read on every call. A threshold of 0 returns an empty,
/// disabled set without touching the usage store.
pub async fn compute_eligible(
    clients: &dyn ClientRepo,
    settings: &dyn SettingRepo,
    now: DateTime<Utc>,
) -> Result<EligibleSet, ScanError> {
    let threshold_days = settings
        .get_auto_delete_days()
        .await
        .map_err(ScanError::Threshold)?;

    if threshold_days == 0 {
        return Ok(EligibleSet::default());
    }

    let limit = expiry_limit_ms(now, threshold_days);
    let eligible = clients
        .list_depleted(limit)
        .await
        .map_err(ScanError::Query)?
        .into_iter()
        .filter_map(|usage| {
            let reason = usage.depletion(limit)?;
            Some(EligibleClient {
                inbound_id: usage.inbound_id,
                email: usage.email,
                reason,
            })
        })
        .collect();

    Ok(EligibleSet {
        threshold_days,
        expiry_limit_ms: Some(limit),
        clients: eligible,
    })
}

/// How a run ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunStatus {
    /// Every eligible client was attempted.
    #[default]
    Completed,
    /// The time budget ran out before every client was attempted.
    Partial,
    /// Threshold is 0.
    Disabled,
    /// The threshold, the usage store or the run lease could not be read.
    /// Nothing was deleted.
    Aborted,
    /// Another process holds the run lease. Nothing was scanned.
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Partial => "partial",
            RunStatus::Disabled => "disabled",
            RunStatus::Aborted => "aborted",
            RunStatus::Skipped => "skipped",
        }
    }
}

/// A client whose removal failed.
#[derive(Debug, Clone)]
pub struct RemovalFailure {
    pub inbound_id: i64,
    pub email: String,
    pub error: String,
}

/// Results from a single auto-delete run.
#[derive(Debug, Default)]
pub struct AutoDeleteRunResult {
    pub status: RunStatus,
    /// Threshold the run used.
    pub threshold_days: i64,
    /// Number of clients the scan selected.
    pub eligible: u64,
    /// Number of clients removed (or that would have been, in dry-run mode).
    pub removed: u64,
    /// Number of clients whose removal failed.
    pub failed: u64,
    /// Number of clients left for the next cycle because the time budget ran out.
    pub skipped: u64,
    /// Removed clients broken down by depletion reason.
    pub removed_by_reason: BTreeMap<DepletionReason, u64>,
    pub failures: Vec<RemovalFailure>,
    pub dry_run: bool,
    /// Duration of the run in milliseconds.
    pub duration_ms: u64,
}

impl AutoDeleteRunResult {
    /// Check if any clients were removed.
    pub fn has_deletions(&self) -> bool {
        self.removed > 0
    }

    fn record_removed(&mut self, reason: DepletionReason) {
        self.removed += 1;
        *self.removed_by_reason.entry(reason).or_default() += 1;
    }
}

/// How long a run lease stays valid without renewal.
const RUN_LEASE_TTL: Duration = Duration::from_secs(10 * 60);

/// The auto-delete job: scanner plus remover.
pub struct AutoDeleteJob {
    clients: Arc<dyn ClientRepo>,
    settings: Arc<dyn SettingRepo>,
    leases: Arc<dyn JobLeaseRepo>,
    remover: ClientRemover,
    /// Unique per job instance, identifies this process as lease holder.
    holder: String,
    lease_ttl: Duration,
    dry_run: bool,
    max_duration: Option<Duration>,
}

impl AutoDeleteJob {
    pub fn new(
        clients: Arc<dyn ClientRepo>,
        settings: Arc<dyn SettingRepo>,
        leases: Arc<dyn JobLeaseRepo>,
        remover: ClientRemover,
        config: &AutoDeleteJobConfig,
    ) -> Self {
        Self {
            clients,
            settings,
            leases,
            remover,
            holder: uuid::Uuid::new_v4().to_string(),
            lease_ttl: RUN_LEASE_TTL,
            dry_run: config.dry_run,
            max_duration: config.max_duration(),
        }
    }

    /// Build the job from a database pool.
    pub fn from_pool(
        db: &DbPool,
        regenerator: Arc<dyn ConfigRegenerator>,
        config: &AutoDeleteJobConfig,
    ) -> Self {
        let remover = ClientRemover::new(db.clients(), regenerator);
        Self::new(db.clients(), db.settings(), db.leases(), remover, config)
    }

    /// Override dry-run mode (used by `run-once --dry-run`).
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Override the per-run time budget.
    pub fn with_max_duration(mut self, max_duration: Option<Duration>) -> Self {
        self.max_duration = max_duration;
        self
    }

    #[cfg(test)]
    fn with_lease_ttl(mut self, lease_ttl: Duration) -> Self {
        self.lease_ttl = lease_ttl;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn compute_eligible(&self, now: DateTime<Utc>) -> Result<EligibleSet, ScanError> {
        compute_eligible(self.clients.as_ref(), self.settings.as_ref(), now).await
    }

    /// Run a single pass: take the run lease, scan, then remove every
    /// eligible client in order.
    ///
    /// Dry runs delete nothing and do not take the lease.
    pub async fn run(&self, now: DateTime<Utc>) -> AutoDeleteRunResult {
        if self.dry_run {
            return self.run_pass(now, false).await;
        }

        match self.renew_lease().await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("Another process holds the auto-delete lease, skipping this run");
                metrics::record_auto_delete_skipped();
                return AutoDeleteRunResult {
                    status: RunStatus::Skipped,
                    ..Default::default()
                };
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to acquire auto-delete lease, nothing deleted");
                let result = AutoDeleteRunResult {
                    status: RunStatus::Aborted,
                    ..Default::default()
                };
                return finish(result, Instant::now());
            }
        }

        let result = self.run_pass(now, true).await;

        if let Err(e) = self.leases.release(AUTO_DELETE_LEASE, &self.holder).await {
            tracing::warn!(
                error = %e,
                "Failed to release auto-delete lease, it expires on its own"
            );
        }
        result
    }

    /// Take the run lease, or extend it if this job already holds it.
    async fn renew_lease(&self) -> Result<bool, DbError> {
        let now_ms = Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(self.lease_ttl.as_millis()).unwrap_or(i64::MAX);
        self.leases
            .try_acquire(
                AUTO_DELETE_LEASE,
                &self.holder,
                now_ms,
                now_ms.saturating_add(ttl_ms),
            )
            .await
    }

    async fn run_pass(&self, now: DateTime<Utc>, holds_lease: bool) -> AutoDeleteRunResult {
        let start = Instant::now();
        let dry_run_msg = if self.dry_run { " (DRY RUN)" } else { "" };
        let mut result = AutoDeleteRunResult {
            dry_run: self.dry_run,
            ..Default::default()
        };

        let eligible = match self.compute_eligible(now).await {
            Ok(set) => set,
            Err(e @ ScanError::Threshold(_)) => {
                tracing::warn!(error = %e, "Skipping auto-delete run, threshold unavailable");
                result.status = RunStatus::Aborted;
                return finish(result, start);
            }
            Err(e @ ScanError::Query(_)) => {
                tracing::error!(error = %e, "Auto-delete scan failed, nothing deleted");
                result.status = RunStatus::Aborted;
                return finish(result, start);
            }
        };

        if eligible.is_disabled() {
            tracing::debug!("Auto-delete threshold is 0, nothing to do");
            result.status = RunStatus::Disabled;
            return finish(result, start);
        }

        result.threshold_days = eligible.threshold_days;
        result.eligible = eligible.clients.len() as u64;

        if !eligible.clients.is_empty() {
            tracing::debug!(
                count = eligible.clients.len(),
                threshold_days = eligible.threshold_days,
                expiry_limit_ms = eligible.expiry_limit_ms,
                "Found depleted clients to remove"
            );
        }

        let total = eligible.clients.len();
        let mut last_renewal = Instant::now();
        for (index, client) in eligible.clients.into_iter().enumerate() {
            if let Some(max_dur) = self.max_duration
                && start.elapsed() > max_dur
            {
                result.skipped = (total - index) as u64;
                result.status = RunStatus::Partial;
                tracing::info!(
                    processed = index,
                    skipped = result.skipped,
                    "Max auto-delete duration exceeded, stopping early"
                );
                break;
            }

            if holds_lease && last_renewal.elapsed() >= self.lease_ttl / 3 {
                let renewed = self.renew_lease().await;
                if !matches!(renewed, Ok(true)) {
                    result.skipped = (total - index) as u64;
                    result.status = RunStatus::Partial;
                    tracing::warn!(
                        processed = index,
                        skipped = result.skipped,
                        error = ?renewed.err(),
                        "Lost the auto-delete lease, stopping early"
                    );
                    break;
                }
                last_renewal = Instant::now();
            }

            if self.dry_run {
                tracing::info!(
                    inbound_id = client.inbound_id,
                    email = %client.email,
                    reason = %client.reason,
                    "DRY RUN: Would delete client"
                );
                result.record_removed(client.reason);
                continue;
            }

            match self
                .remover
                .remove_client(client.inbound_id, &client.email)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        inbound_id = client.inbound_id,
                        email = %client.email,
                        reason = %client.reason,
                        "Deleted depleted client"
                    );
                    metrics::record_clients_removed(client.reason.as_str(), 1);
                    result.record_removed(client.reason);
                }
                Err(e) => {
                    tracing::error!(
                        inbound_id = client.inbound_id,
                        email = %client.email,
                        reason = %client.reason,
                        error = %e,
                        "Failed to delete depleted client"
                    );
                    metrics::record_client_removal_error();
                    result.failed += 1;
                    result.failures.push(RemovalFailure {
                        inbound_id: client.inbound_id,
                        email: client.email,
                        error: e.to_string(),
                    });
                }
            }
        }

        if result.failed > 0 && result.removed == 0 {
            tracing::error!(
                failed = result.failed,
                "Every client removal in this run failed, the usage store may be unavailable"
            );
        }

        let result = finish(result, start);
        if result.has_deletions() || result.failed > 0 {
            tracing::info!(
                removed = result.removed,
                failed = result.failed,
                skipped = result.skipped,
                threshold_days = result.threshold_days,
                duration_ms = result.duration_ms,
                dry_run = result.dry_run,
                "Auto-delete run complete{}",
                dry_run_msg
            );
        } else {
            tracing::debug!("Auto-delete run complete, no clients to remove");
        }
        result
    }
}

fn finish(mut result: AutoDeleteRunResult, start: Instant) -> AutoDeleteRunResult {
    let elapsed = start.elapsed();
    result.duration_ms = elapsed.as_millis() as u64;
    metrics::record_auto_delete_run(result.status.as_str(), elapsed.as_secs_f64());
    result
}
