//! Fixed-cadence trigger for the auto-delete job.
//!
//! The scheduler owns a `Created -> Running -> Stopped` lifecycle and a single
//! run-in-progress flag shared by the scheduled loop and manual triggers, so
//! at most one run executes at a time. Overlapping triggers are skipped.

use std::{
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use cron::Schedule;
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::auto_delete::{AutoDeleteJob, AutoDeleteRunResult};
use crate::observability::metrics;

/// Daily at 00:00:00 UTC (`sec min hour day-of-month month day-of-week`).
pub const AUTO_DELETE_SCHEDULE: &str = "0 0 0 * * *";

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Scheduler already started")]
    AlreadyStarted,

    #[error("Scheduler stopped")]
    Stopped,

    #[error("Auto-delete run panicked or was cancelled: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Created,
    Running,
    Stopped,
}

/// Outcome of a manual trigger.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(AutoDeleteRunResult),
    /// Another run was already executing.
    Skipped,
}

struct Shared {
    state: Mutex<SchedulerState>,
    running: AtomicBool,
    skipped_ticks: AtomicU64,
}

impl Shared {
    /// Claim the run slot.
    ///
    /// The state check and the claim happen under the state lock, so once
    /// `stop()` has returned no new run can begin.
    fn begin_run(self: &Arc<Self>) -> Result<Option<RunGuard>, SchedulerError> {
        let state = self.state.lock();
        if *state == SchedulerState::Stopped {
            return Err(SchedulerError::Stopped);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }
        Ok(Some(RunGuard {
            shared: Arc::clone(self),
        }))
    }
}

/// Releases the run slot when dropped.
struct RunGuard {
    shared: Arc<Shared>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
    }
}

pub struct JobScheduler {
    job: Arc<AutoDeleteJob>,
    schedule: String,
    run_on_start: bool,
    shared: Arc<Shared>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl JobScheduler {
    pub fn new(job: Arc<AutoDeleteJob>) -> Self {
        Self::with_schedule(job, AUTO_DELETE_SCHEDULE)
    }

    pub(crate) fn with_schedule(job: Arc<AutoDeleteJob>, schedule: &str) -> Self {
        Self {
            job,
            schedule: schedule.to_string(),
            run_on_start: false,
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState::Created),
                running: AtomicBool::new(false),
                skipped_ticks: AtomicU64::new(0),
            }),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Run one cycle as soon as the scheduler starts.
    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state.lock()
    }

    /// Scheduled ticks that found a run already in progress.
    pub fn skipped_ticks(&self) -> u64 {
        self.shared.skipped_ticks.load(Ordering::Relaxed)
    }

    /// Register the schedule and spawn the trigger loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let schedule = Schedule::from_str(&self.schedule)
            .map_err(|e| SchedulerError::InvalidSchedule(format!("'{}': {e}", self.schedule)))?;

        {
            let mut state = self.shared.state.lock();
            match *state {
                SchedulerState::Running => return Err(SchedulerError::AlreadyStarted),
                SchedulerState::Stopped => return Err(SchedulerError::Stopped),
                SchedulerState::Created => *state = SchedulerState::Running,
            }
        }

        self.tracker.spawn(trigger_loop(
            Arc::clone(&self.job),
            schedule,
            Arc::clone(&self.shared),
            self.cancel.clone(),
            self.run_on_start,
        ));

        tracing::info!(
            schedule = %self.schedule,
            dry_run = self.job.is_dry_run(),
            run_on_start = self.run_on_start,
            "Auto-delete scheduler started"
        );
        Ok(())
    }

    /// Stop firing new runs. A run already executing is left to finish.
    ///
    /// Idempotent; calling it before `start()` prevents the scheduler from
    /// ever starting.
    pub fn stop(&self) {
        let previous = {
            let mut state = self.shared.state.lock();
            std::mem::replace(&mut *state, SchedulerState::Stopped)
        };
        self.cancel.cancel();
        if previous != SchedulerState::Stopped {
            tracing::info!("Auto-delete scheduler stopped");
        }
    }

    /// Stop, then wait for the trigger loop and any in-flight run to finish.
    pub async fn shutdown(&self) {
        self.stop();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Run one cycle now, outside the schedule.
    ///
    /// Returns [`RunOutcome::Skipped`] when a run is already in progress.
    pub async fn trigger(&self) -> Result<RunOutcome, SchedulerError> {
        let Some(guard) = self.shared.begin_run()? else {
            tracing::info!("Auto-delete run already in progress, skipping trigger");
            return Ok(RunOutcome::Skipped);
        };

        let job = Arc::clone(&self.job);
        let handle = self.tracker.spawn(async move {
            let _guard = guard;
            job.run(Utc::now()).await
        });
        Ok(RunOutcome::Completed(handle.await?))
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn trigger_loop(
    job: Arc<AutoDeleteJob>,
    schedule: Schedule,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    run_on_start: bool,
) {
    if run_on_start && !run_scheduled(&job, &shared).await {
        return;
    }

    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            tracing::warn!("Auto-delete schedule has no upcoming time, stopping trigger loop");
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(next_run = %next, "Next auto-delete run scheduled");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        if !run_scheduled(&job, &shared).await {
            break;
        }
    }

    tracing::debug!("Auto-delete trigger loop exited");
}

/// Returns false once the scheduler has been stopped.
async fn run_scheduled(job: &AutoDeleteJob, shared: &Arc<Shared>) -> bool {
    match shared.begin_run() {
        Err(_) => false,
        Ok(None) => {
            tracing::info!("Previous auto-delete run still in progress, skipping this tick");
            shared.skipped_ticks.fetch_add(1, Ordering::Relaxed);
            metrics::record_auto_delete_skipped();
            true
        }
        Ok(Some(_guard)) => {
            job.run(Utc::now()).await;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;

    #[test]
    fn test_daily_schedule_fires_at_utc_midnight() {
        let schedule = Schedule::from_str(AUTO_DELETE_SCHEDULE).unwrap();
        let mut upcoming = schedule.upcoming(Utc);
        let first = upcoming.next().unwrap();
        let second = upcoming.next().unwrap();

        assert_eq!((first.hour(), first.minute(), first.second()), (0, 0, 0));
        assert_eq!(second - first, chrono::Duration::days(1));
    }
}
