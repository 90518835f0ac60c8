//! Background job configuration.
//!
//! The auto-delete cadence is fixed (daily at UTC midnight). Only how a run
//! behaves is configurable here. How many days an expired client is kept is
//! an operator setting stored in the database, not a config value.
//!
//! # Example
//!
//! ```toml
//! [jobs.auto_delete]
//! enabled = true
//! dry_run = false
//! max_duration_secs = 300
//! run_on_start = false
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobsConfig {
    /// Depleted/expired client reclamation.
    #[serde(default)]
    pub auto_delete: AutoDeleteJobConfig,
}

impl JobsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auto_delete.validate()
    }
}

/// Depleted/expired client reclamation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutoDeleteJobConfig {
    /// Whether the scheduler is started at all.
    /// Default: true. The job is still a no-op while the stored threshold is 0.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log what would be deleted without deleting anything.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,

    /// Per-run time budget in seconds. Clients not reached before the budget
    /// runs out are left for the next cycle.
    /// Default: 0 (unlimited)
    #[serde(default)]
    pub max_duration_secs: u64,

    /// Run one cycle immediately when the service starts, in addition to the
    /// daily schedule.
    /// Default: false
    #[serde(default)]
    pub run_on_start: bool,
}

impl Default for AutoDeleteJobConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dry_run: false,
            max_duration_secs: 0,
            run_on_start: false,
        }
    }
}

impl AutoDeleteJobConfig {
    /// The per-run time budget, if any.
    pub fn max_duration(&self) -> Option<std::time::Duration> {
        (self.max_duration_secs > 0).then(|| std::time::Duration::from_secs(self.max_duration_secs))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // A budget longer than the cadence would let runs overlap the next tick.
        if self.max_duration_secs >= 24 * 60 * 60 {
            return Err(ConfigError::Validation(
                "jobs.auto_delete.max_duration_secs must be less than one day".into(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
