//! Testing utilities and mock implementations.
//!
//! This module provides in-memory implementations of the orchestrator's
//! collaborators, so every stage can be driven without a database or a
//! remote API.
//!
//! # Example
//!
//! ```rust,ignore
//! use jobline_core::testing::{fixtures, MockArtifactStore, MockJobClient, MockJobStore};
//!
//! let store = MockJobStore::new();
//! store.insert(fixtures::job(1, "Posted", "job-1"));
//!
//! let client = MockJobClient::new();
//! client.set_progress("job-1", 1.0).await;
//! ```

mod mock_artifact_store;
mod mock_job_client;
mod mock_job_store;

pub use mock_artifact_store::{MockArtifactStore, RecordedWrite};
pub use mock_job_client::{ClientOp, MockJobClient, RecordedCall};
pub use mock_job_store::MockJobStore;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{NaiveDate, Utc};

    use crate::job::{JobId, JobRecord};

    /// Date used by fixture jobs.
    pub fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap_or_default()
    }

    /// Create a job record with a raw status string and detail.
    pub fn job(id: JobId, status: &str, detail: &str) -> JobRecord {
        JobRecord {
            id,
            name: format!("Report{}", id),
            as_of: as_of(),
            status_name: status.to_string(),
            detail: detail.to_string(),
            updated_at: Utc::now(),
        }
    }

    /// Request parameters in the shape the jobs API expects.
    pub fn submit_params(view: &str) -> String {
        format!(
            r#"{{"data":{{"type":"portfolio_view_results","attributes":{{"view_id":"{}","portfolio_type":"firm","portfolio_id":1,"output_type":"json"}}}}}}"#,
            view
        )
    }
}
