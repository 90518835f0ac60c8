//! Prometheus metrics for the background jobs.
//!
//! Provides metrics for:
//! - Auto-delete run outcomes and durations
//! - Clients removed, by depletion reason
//! - Per-client removal failures
//!
//! Without the `prometheus` feature every recording function is a no-op.

#[cfg(feature = "prometheus")]
use metrics::{counter, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;

/// Initialize the metrics system and start the scrape endpoint.
///
/// Must be called from within a tokio runtime.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let addr = config
        .listen_addr()
        .map_err(|e| MetricsError::Setup(e.to_string()))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            &config.duration_buckets_secs,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?
        .install()?;

    tracing::info!(listen = %addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if config.enabled {
        tracing::warn!(
            "Metrics are enabled in config but the 'prometheus' feature is not compiled. \
            Rebuild with: cargo build --features prometheus"
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record a finished auto-delete run.
///
/// # Arguments
/// * `outcome` - `completed`, `partial` (budget exhausted), `disabled` or
///   `aborted`
/// * `duration_secs` - Wall time of the run
pub fn record_auto_delete_run(outcome: &str, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "auto_delete_runs_total",
            "outcome" => outcome.to_string()
        )
        .increment(1);
        histogram!("auto_delete_run_duration_seconds").record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (outcome, duration_secs);
    }
}

/// Record a run that never started because another run was in progress.
///
/// Only the run counter moves; a skipped run has no duration sample.
pub fn record_auto_delete_skipped() {
    #[cfg(feature = "prometheus")]
    {
        counter!("auto_delete_runs_total", "outcome" => "skipped").increment(1);
    }
}

/// Record clients removed by the auto-delete job.
///
/// # Arguments
/// * `reason` - Why the clients were eligible (`quota_exhausted`, `expired`,
///   `quota_exhausted_and_expired`)
/// * `count` - Number of clients removed
pub fn record_clients_removed(reason: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "auto_delete_clients_removed_total",
            "reason" => reason.to_string()
        )
        .increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (reason, count);
    }
}

/// Record a client whose removal failed.
pub fn record_client_removal_error() {
    #[cfg(feature = "prometheus")]
    {
        counter!("auto_delete_client_errors_total").increment(1);
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
