//! Fan-in aggregation over a bundle's jobs.
//!
//! Pure read-and-classify: the same verdict gates composition (asset jobs)
//! and finalization (render jobs).

use serde::Serialize;

use crate::ledger::{Job, JobClass, JobLedger, LedgerError};

/// Classified outcome of a fan-in check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FanInOutcome {
    /// At least one job is still pending or processing (or none exist yet).
    Waiting,
    /// Every job completed.
    AllSucceeded,
    /// Some jobs completed, some failed.
    PartialSuccess,
    /// Every job failed.
    AllFailed,
}

impl FanInOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FanInOutcome::Waiting => "waiting",
            FanInOutcome::AllSucceeded => "all_succeeded",
            FanInOutcome::PartialSuccess => "partial_success",
            FanInOutcome::AllFailed => "all_failed",
        }
    }
}

/// Snapshot of one class of jobs for a bundle.
#[derive(Debug, Clone)]
pub struct FanInVerdict {
    pub all_done: bool,
    pub any_succeeded: bool,
    pub any_failed: bool,
    pub jobs: Vec<Job>,
}

impl FanInVerdict {
    /// Classify an already-loaded job list.
    ///
    /// An empty list is never "done": the barrier has nothing to wait on, so
    /// the caller decides what an empty fan-out means.
    pub fn from_jobs(jobs: Vec<Job>) -> Self {
        let all_done = !jobs.is_empty() && jobs.iter().all(Job::is_terminal);
        let any_succeeded = jobs.iter().any(Job::succeeded);
        let any_failed = jobs.iter().any(Job::failed);

        Self {
            all_done,
            any_succeeded,
            any_failed,
            jobs,
        }
    }

    pub fn outcome(&self) -> FanInOutcome {
        match (self.all_done, self.any_succeeded, self.any_failed) {
            (false, _, _) => FanInOutcome::Waiting,
            (true, true, false) => FanInOutcome::AllSucceeded,
            (true, true, true) => FanInOutcome::PartialSuccess,
            (true, false, _) => FanInOutcome::AllFailed,
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(|j| j.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(|j| j.failed())
    }
}

/// Load every job of `class` for the bundle and classify them.
pub fn all_terminal(
    ledger: &dyn JobLedger,
    bundle_id: &str,
    class: JobClass,
) -> Result<FanInVerdict, LedgerError> {
    let jobs = ledger.list_by_bundle(bundle_id, class)?;
    Ok(FanInVerdict::from_jobs(jobs))
}
