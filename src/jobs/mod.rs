//! Background jobs for the panel.
//!
//! - **Auto-delete**: Removes clients that exhausted their traffic quota or
//!   expired more than N days ago, where N is the operator's stored threshold
//!   (0 disables the job).
//!
//! The job is split the same way as other maintenance workers:
//! 1. Configuration in `config/jobs.rs`
//! 2. A scheduler that fires on a fixed daily cadence
//! 3. A run function that performs a single pass
//! 4. A structured result type for tracking what happened
//! 5. Metrics for monitoring
//!
//! # Example
//!
//! ```toml
//! [jobs.auto_delete]
//! enabled = true
//! dry_run = false
//! max_duration_secs = 300
//! ```

mod auto_delete;
mod scheduler;

pub use auto_delete::{
    AutoDeleteJob, AutoDeleteRunResult, EligibleClient, EligibleSet, RemovalFailure, RunStatus,
    ScanError, compute_eligible,
};
pub use scheduler::{
    AUTO_DELETE_SCHEDULE, JobScheduler, RunOutcome, SchedulerError, SchedulerState,
};
