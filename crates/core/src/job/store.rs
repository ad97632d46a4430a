//! Persistence gateway trait and types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{JobDetail, JobId, JobRecord, JobStatus, RowCount};

/// Error type for persistence gateway operations.
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// Job not found.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),

    /// Staging import procedure failed.
    #[error("staging import failed: {0}")]
    Import(String),

    /// Target merge procedure failed.
    #[error("target merge failed: {0}")]
    Merge(String),

    /// Stored record could not be read back.
    #[error("invalid job record {id}: {reason}")]
    InvalidRecord { id: JobId, reason: String },
}

impl From<rusqlite::Error> for JobStoreError {
    fn from(e: rusqlite::Error) -> Self {
        JobStoreError::Database(e.to_string())
    }
}

/// Request to enqueue a new job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    /// Logical job type.
    pub name: String,
    /// Date the requested data is valid for.
    pub as_of: NaiveDate,
    /// JSON request parameters for the external API.
    pub params: String,
}

/// One entry of a job's transition history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub job_id: JobId,
    /// Status before the transition, as stored (None for creation).
    pub from_status: Option<String>,
    pub to_status: JobStatus,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

/// Persistence gateway: the job queue plus the import and merge procedures.
///
/// `record_transition` is the only operation that changes a job's status or
/// detail, and every call is kept in the job's history.
pub trait JobStore: Send + Sync {
    /// Jobs that are neither Completed nor Error, ordered by id.
    fn list_open_jobs(&self) -> Result<Vec<JobRecord>, JobStoreError>;

    /// Every job, ordered by id.
    fn list_all(&self) -> Result<Vec<JobRecord>, JobStoreError>;

    /// Get a job by ID.
    fn get(&self, id: JobId) -> Result<Option<JobRecord>, JobStoreError>;

    /// Write a job's new status and detail.
    fn record_transition(&self, id: JobId, detail: &JobDetail) -> Result<(), JobStoreError>;

    /// Load the artifact at `location` into the staging table for `job`.
    fn run_staging_import(&self, job: &JobRecord, location: &str)
        -> Result<RowCount, JobStoreError>;

    /// Move `job`'s staged rows into the target table.
    ///
    /// `staged` is the count recorded by the import step and is checked against
    /// what is actually staged.
    fn run_target_merge(&self, job: &JobRecord, staged: RowCount)
        -> Result<RowCount, JobStoreError>;

    /// Transition history of a job, oldest first.
    fn history(&self, id: JobId) -> Result<Vec<TransitionRecord>, JobStoreError>;
}
