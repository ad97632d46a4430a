//! Types for the job orchestrator.

use serde::Serialize;
use thiserror::Error;

use crate::job::{JobDetail, JobStatus, JobStoreError};

/// Errors that abort a whole batch.
///
/// Per-job failures never surface here; they are recorded on the job.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The open-job set could not be read.
    #[error("failed to list open jobs: {0}")]
    ListJobs(#[from] JobStoreError),
}

/// A forward move a stage handler wants persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    detail: JobDetail,
    rerunnable: bool,
}

impl Transition {
    /// Move to the status `detail` belongs to.
    pub fn to(detail: JobDetail) -> Self {
        let rerunnable = detail.status().allows_immediate_rerun();
        Self { detail, rerunnable }
    }

    /// Move to Error with a diagnostic message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::to(JobDetail::Error(message.into()))
    }

    pub fn status(&self) -> JobStatus {
        self.detail.status()
    }

    pub fn detail(&self) -> &JobDetail {
        &self.detail
    }

    /// True if the job can make further progress in the same session.
    pub fn rerunnable(&self) -> bool {
        self.rerunnable
    }

    /// Returns true if this is a legal move out of `from`: the next stage or Error.
    pub fn is_forward_from(&self, from: JobStatus) -> bool {
        let to = self.status();
        to == JobStatus::Error || from.successor() == Some(to)
    }
}

/// Result of running one stage handler against one job.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Persist a status change.
    Transition(Transition),
    /// Nothing to persist yet; the job stays where it is.
    Hold { reason: String },
    /// The job or a collaborator broke its contract. The record is left as is.
    Violation { reason: String },
}

impl StageOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        StageOutcome::Transition(Transition::failed(message))
    }

    pub fn advance(detail: JobDetail) -> Self {
        StageOutcome::Transition(Transition::to(detail))
    }

    pub fn violation(reason: impl ToString) -> Self {
        StageOutcome::Violation {
            reason: reason.to_string(),
        }
    }
}

/// Counters for one pass over the open jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Open jobs listed at the start of the pass.
    pub jobs_seen: usize,
    /// Transitions written, including moves to Error.
    pub transitions: usize,
    /// Transitions written that moved a job to Error.
    pub failed: usize,
    /// Jobs left unchanged because the external job is still running.
    pub held: usize,
    /// Jobs whose status has no stage handler.
    pub unhandled: usize,
    /// Jobs left unchanged because of a contract violation.
    pub violations: usize,
    /// Transitions that could not be written.
    pub write_failures: usize,
    /// True if at least one written transition allows immediate progress.
    pub rerun: bool,
}

impl BatchReport {
    fn absorb(&mut self, other: &BatchReport) {
        self.jobs_seen += other.jobs_seen;
        self.transitions += other.transitions;
        self.failed += other.failed;
        self.held += other.held;
        self.unhandled += other.unhandled;
        self.violations += other.violations;
        self.write_failures += other.write_failures;
        self.rerun = other.rerun;
    }
}

/// Summary of consecutive passes run until nothing was left to rerun.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub passes: u32,
    /// Sums over all passes. `rerun` reflects the last pass.
    pub totals: BatchReport,
    /// True if the session stopped at the configured pass limit.
    pub hit_pass_limit: bool,
}

impl SessionReport {
    pub(crate) fn record_pass(&mut self, batch: &BatchReport) {
        self.passes += 1;
        self.totals.absorb(batch);
    }
}
