//! Status-dependent job detail payloads.
//!
//! A job carries a single `detail` string whose meaning depends on its status:
//!
//! | Status     | Detail                                  |
//! |------------|-----------------------------------------|
//! | Queued     | JSON request parameters to submit       |
//! | Posted     | external job handle                     |
//! | Downloaded | artifact location of the fetched data   |
//! | Imported   | rows loaded into the staging table      |
//! | Completed  | rows merged into the target table       |
//! | Error      | human-readable failure description      |
//!
//! [`JobDetail`] is the parsed form. Stage handlers only ever see the variant
//! matching the job's status.

use std::fmt;

use thiserror::Error;

use super::JobStatus;

/// A stored detail does not match the schema of its status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetailError {
    #[error("{status} detail is empty")]
    Empty { status: JobStatus },

    #[error("Queued detail is not valid JSON: {reason}")]
    InvalidParams { reason: String },

    #[error("Posted detail contains whitespace: {0:?}")]
    InvalidHandle(String),

    #[error("{status} detail is not a row count: {raw:?}")]
    InvalidRowCount { status: JobStatus, raw: String },
}

/// Request parameters for the external job API (JSON text).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitParams(String);

impl SubmitParams {
    pub fn parse(raw: &str) -> Result<Self, DetailError> {
        if raw.trim().is_empty() {
            return Err(DetailError::Empty {
                status: JobStatus::Queued,
            });
        }
        serde_json::from_str::<serde_json::Value>(raw).map_err(|e| {
            DetailError::InvalidParams {
                reason: e.to_string(),
            }
        })?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Opaque job identifier issued by the external API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalHandle(String);

impl ExternalHandle {
    pub fn parse(raw: &str) -> Result<Self, DetailError> {
        if raw.is_empty() {
            return Err(DetailError::Empty {
                status: JobStatus::Posted,
            });
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(DetailError::InvalidHandle(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Where a downloaded payload was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation(String);

impl ArtifactLocation {
    pub fn parse(raw: &str) -> Result<Self, DetailError> {
        if raw.trim().is_empty() {
            return Err(DetailError::Empty {
                status: JobStatus::Downloaded,
            });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Number of rows moved by an import or merge procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RowCount(pub u64);

impl RowCount {
    /// Parse the detail of an Imported or Completed job.
    pub fn parse(status: JobStatus, raw: &str) -> Result<Self, DetailError> {
        raw.trim()
            .parse::<u64>()
            .map(RowCount)
            .map_err(|_| DetailError::InvalidRowCount {
                status,
                raw: raw.to_string(),
            })
    }
}

impl fmt::Display for RowCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parsed job detail, tagged by the status it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobDetail {
    Queued(SubmitParams),
    Posted(ExternalHandle),
    Downloaded(ArtifactLocation),
    Imported(RowCount),
    Completed(RowCount),
    Error(String),
}

impl JobDetail {
    /// Parse a stored detail according to the status it was stored with.
    pub fn parse(status: JobStatus, raw: &str) -> Result<Self, DetailError> {
        match status {
            JobStatus::Queued => SubmitParams::parse(raw).map(JobDetail::Queued),
            JobStatus::Posted => ExternalHandle::parse(raw).map(JobDetail::Posted),
            JobStatus::Downloaded => ArtifactLocation::parse(raw).map(JobDetail::Downloaded),
            JobStatus::Imported => RowCount::parse(status, raw).map(JobDetail::Imported),
            JobStatus::Completed => RowCount::parse(status, raw).map(JobDetail::Completed),
            JobStatus::Error => Ok(JobDetail::Error(raw.to_string())),
        }
    }

    /// The status this detail belongs to.
    pub fn status(&self) -> JobStatus {
        match self {
            JobDetail::Queued(_) => JobStatus::Queued,
            JobDetail::Posted(_) => JobStatus::Posted,
            JobDetail::Downloaded(_) => JobStatus::Downloaded,
            JobDetail::Imported(_) => JobStatus::Imported,
            JobDetail::Completed(_) => JobStatus::Completed,
            JobDetail::Error(_) => JobStatus::Error,
        }
    }
}

/// Renders the storage form.
impl fmt::Display for JobDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobDetail::Queued(params) => f.write_str(params.as_str()),
            JobDetail::Posted(handle) => f.write_str(handle.as_str()),
            JobDetail::Downloaded(location) => f.write_str(location.as_str()),
            JobDetail::Imported(rows) | JobDetail::Completed(rows) => write!(f, "{}", rows),
            JobDetail::Error(message) => f.write_str(message),
        }
    }
}
