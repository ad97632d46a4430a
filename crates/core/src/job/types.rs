//! Job record and status types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a job record in the persistence gateway.
pub type JobId = i64;

/// Status value that is not part of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized job status: {0:?}")]
pub struct UnknownStatus(pub String);

/// Pipeline stage of a job.
///
/// ```text
/// Queued -> Posted -> Downloaded -> Imported -> Completed
///    |         |          |            |
///    +---------+----------+------------+-----> Error
/// ```
///
/// `Completed` and `Error` are terminal: no stage handler exists for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Waiting to be submitted to the external API.
    Queued,
    /// Submitted; the external job is running.
    Posted,
    /// Result fetched and written to the artifact store.
    Downloaded,
    /// Artifact loaded into the staging table.
    Imported,
    /// Staged rows merged into the target table (terminal).
    Completed,
    /// A stage failed (terminal until reset by an operator).
    Error,
}

impl JobStatus {
    /// Every status, in pipeline order.
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Queued,
        JobStatus::Posted,
        JobStatus::Downloaded,
        JobStatus::Imported,
        JobStatus::Completed,
        JobStatus::Error,
    ];

    /// Storage name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "Queued",
            JobStatus::Posted => "Posted",
            JobStatus::Downloaded => "Downloaded",
            JobStatus::Imported => "Imported",
            JobStatus::Completed => "Completed",
            JobStatus::Error => "Error",
        }
    }

    /// The single forward stage after this one, if any.
    pub fn successor(&self) -> Option<JobStatus> {
        match self {
            JobStatus::Queued => Some(JobStatus::Posted),
            JobStatus::Posted => Some(JobStatus::Downloaded),
            JobStatus::Downloaded => Some(JobStatus::Imported),
            JobStatus::Imported => Some(JobStatus::Completed),
            JobStatus::Completed | JobStatus::Error => None,
        }
    }

    /// Returns true if no stage handler advances this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Returns true if a job that just entered this status can make further
    /// progress in the same session without waiting on the external system.
    pub fn allows_immediate_rerun(&self) -> bool {
        matches!(self, JobStatus::Downloaded | JobStatus::Imported)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A persisted unit of work.
///
/// `status` and `detail` are kept as stored. Use [`JobRecord::status`] and
/// [`crate::job::JobDetail::parse`] to interpret them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    /// Logical job type, e.g. "Holdings" or "Accounts".
    pub name: String,
    /// Date the fetched data is valid for.
    pub as_of: NaiveDate,
    /// Raw status as stored.
    #[serde(rename = "status")]
    pub status_name: String,
    /// Status-dependent payload as stored.
    pub detail: String,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Parse the stored status.
    pub fn status(&self) -> Result<JobStatus, UnknownStatus> {
        self.status_name.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_storage_name() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = "Cancelled".parse::<JobStatus>().unwrap_err();
        assert_eq!(err, UnknownStatus("Cancelled".to_string()));
        assert!("queued".parse::<JobStatus>().is_err());
        assert!("".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_successor_chain_is_linear() {
        let mut chain = vec![JobStatus::Queued];
        while let Some(next) = chain.last().and_then(|s| s.successor()) {
            chain.push(next);
        }
        assert_eq!(
            chain,
            vec![
                JobStatus::Queued,
                JobStatus::Posted,
                JobStatus::Downloaded,
                JobStatus::Imported,
                JobStatus::Completed,
            ]
        );
        assert_eq!(JobStatus::Error.successor(), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Posted.is_terminal());
    }

    #[test]
    fn test_only_downloaded_and_imported_allow_rerun() {
        let rerunnable: Vec<_> = JobStatus::ALL
            .into_iter()
            .filter(JobStatus::allows_immediate_rerun)
            .collect();
        assert_eq!(rerunnable, vec![JobStatus::Downloaded, JobStatus::Imported]);
    }

    #[test]
    fn test_record_status_parse() {
        let record = JobRecord {
            id: 7,
            name: "Holdings".to_string(),
            as_of: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            status_name: "Posted".to_string(),
            detail: "42".to_string(),
            updated_at: Utc::now(),
        };
        assert_eq!(record.status().unwrap(), JobStatus::Posted);
    }
}
