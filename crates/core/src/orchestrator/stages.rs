//! Stage handlers, one per non-terminal status.
//!
//! Each handler reads the job's detail, does its one unit of work, and
//! reports a [`StageOutcome`]. Handlers never write the job record; the
//! runner persists whatever they return.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use super::types::StageOutcome;
use crate::artifact::{ArtifactPaths, ArtifactStore};
use crate::client::{JobClient, JobClientError};
use crate::job::{
    ArtifactLocation, ExternalHandle, JobDetail, JobRecord, JobStatus, JobStore, RowCount,
    SubmitParams,
};

pub(crate) const SUBMIT_FAILED: &str = "Failure posting job - see logs for details.";
pub(crate) const POLL_FAILED: &str = "Failure querying job status - see logs for details.";
pub(crate) const FETCH_FAILED: &str = "Failure downloading job data - see logs for details.";
pub(crate) const IMPORT_FAILED: &str =
    "Failure importing data into staging table - see logs for details.";
pub(crate) const MERGE_FAILED: &str =
    "Failure inserting data into target table - see logs for details.";

/// Longest response body echoed to the log.
const MAX_LOGGED_BODY: usize = 800;

/// Collaborators a stage handler may use.
pub(crate) struct StageContext<'a> {
    pub store: &'a dyn JobStore,
    pub client: &'a dyn JobClient,
    pub artifacts: &'a dyn ArtifactStore,
    pub paths: &'a ArtifactPaths,
    pub api_timeout: Duration,
    pub save_submit_responses: bool,
}

/// The unit of work that advances a job out of its current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Queued -> Posted
    Submit,
    /// Posted -> Downloaded (or held while running)
    Poll,
    /// Downloaded -> Imported
    Import,
    /// Imported -> Completed
    Merge,
}

impl Stage {
    /// The handler for `status`, or `None` for terminal statuses.
    pub fn for_status(status: JobStatus) -> Option<Stage> {
        match status {
            JobStatus::Queued => Some(Stage::Submit),
            JobStatus::Posted => Some(Stage::Poll),
            JobStatus::Downloaded => Some(Stage::Import),
            JobStatus::Imported => Some(Stage::Merge),
            JobStatus::Completed | JobStatus::Error => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Submit => "submit",
            Stage::Poll => "poll",
            Stage::Import => "import",
            Stage::Merge => "merge",
        }
    }

    pub(crate) async fn run(self, job: &JobRecord, ctx: &StageContext<'_>) -> StageOutcome {
        match self {
            Stage::Submit => submit(job, ctx).await,
            Stage::Poll => poll(job, ctx).await,
            Stage::Import => import(job, ctx),
            Stage::Merge => merge(job, ctx),
        }
    }
}

async fn submit(job: &JobRecord, ctx: &StageContext<'_>) -> StageOutcome {
    let params = match SubmitParams::parse(&job.detail) {
        Ok(params) => params,
        Err(e) => return StageOutcome::violation(e),
    };

    info!("Posting job {} ({} as of {})", job.id, job.name, job.as_of);
    let result = bounded(ctx.api_timeout, ctx.client.submit(&params, ctx.api_timeout)).await;

    if ctx.save_submit_responses {
        let raw = match &result {
            Ok(receipt) => Some(receipt.raw_response.as_str()),
            Err(e) => e.body(),
        };
        if let Some(raw) = raw {
            save_response(job, "Submit", raw, ctx).await;
        }
    }

    match result {
        Ok(receipt) => {
            info!(
                "Job {} accepted, external job id = {}",
                job.id,
                receipt.handle.as_str()
            );
            StageOutcome::advance(JobDetail::Posted(receipt.handle))
        }
        Err(e) => {
            error!("Error posting job {}: {}", job.id, e);
            log_body(e.body());
            StageOutcome::failed(SUBMIT_FAILED)
        }
    }
}

async fn poll(job: &JobRecord, ctx: &StageContext<'_>) -> StageOutcome {
    let handle = match ExternalHandle::parse(&job.detail) {
        Ok(handle) => handle,
        Err(e) => return StageOutcome::violation(e),
    };

    info!("Checking status of external job {}", handle.as_str());
    let fraction =
        match bounded(ctx.api_timeout, ctx.client.poll_status(&handle, ctx.api_timeout)).await {
            Ok(fraction) => fraction,
            Err(e) => {
                error!("Error querying status of job {}: {}", job.id, e);
                log_body(e.body());
                return StageOutcome::failed(POLL_FAILED);
            }
        };

    // NaN fails the range check too.
    if !(0.0..=1.0).contains(&fraction) {
        return StageOutcome::violation(format!(
            "external job {} reported completion fraction {} outside [0, 1]",
            handle.as_str(),
            fraction
        ));
    }

    if fraction < 1.0 {
        info!(
            "External job {} is {:.1}% complete",
            handle.as_str(),
            fraction * 100.0
        );
        return StageOutcome::Hold {
            reason: format!("{:.1}% complete", fraction * 100.0),
        };
    }

    info!("External job {} complete, downloading result", handle.as_str());
    let payload =
        match bounded(ctx.api_timeout, ctx.client.fetch_result(&handle, ctx.api_timeout)).await {
            Ok(payload) => payload,
            Err(e) => {
                error!("Error downloading data for job {}: {}", job.id, e);
                log_body(e.body());
                return StageOutcome::failed(FETCH_FAILED);
            }
        };

    let path = ctx.paths.data_path(job);
    let location = match ctx.artifacts.write_text(&path, &payload).await {
        Ok(location) => location,
        Err(e) => {
            error!("Error saving data for job {}: {}", job.id, e);
            return StageOutcome::failed(FETCH_FAILED);
        }
    };

    match ArtifactLocation::parse(&location) {
        Ok(location) => {
            info!("Data for job {} saved to {}", job.id, location.as_str());
            StageOutcome::advance(JobDetail::Downloaded(location))
        }
        Err(e) => {
            error!("Artifact store returned no location for job {}: {}", job.id, e);
            StageOutcome::failed(FETCH_FAILED)
        }
    }
}

fn import(job: &JobRecord, ctx: &StageContext<'_>) -> StageOutcome {
    let location = match ArtifactLocation::parse(&job.detail) {
        Ok(location) => location,
        Err(e) => return StageOutcome::violation(e),
    };

    info!("Importing {} into staging", location.as_str());
    match ctx.store.run_staging_import(job, location.as_str()) {
        Ok(rows) => {
            info!("Staged {} rows for job {}", rows, job.id);
            StageOutcome::advance(JobDetail::Imported(rows))
        }
        Err(e) => {
            error!("Error importing data for job {}: {}", job.id, e);
            StageOutcome::failed(IMPORT_FAILED)
        }
    }
}

fn merge(job: &JobRecord, ctx: &StageContext<'_>) -> StageOutcome {
    let staged = match RowCount::parse(JobStatus::Imported, &job.detail) {
        Ok(rows) => rows,
        Err(e) => return StageOutcome::violation(e),
    };

    info!("Merging {} staged rows for job {}", staged, job.id);
    match ctx.store.run_target_merge(job, staged) {
        Ok(rows) => {
            info!("Inserted {} rows for job {}", rows, job.id);
            StageOutcome::advance(JobDetail::Completed(rows))
        }
        Err(e) => {
            error!("Error inserting data for job {}: {}", job.id, e);
            StageOutcome::failed(MERGE_FAILED)
        }
    }
}

/// Enforce the call timeout even if the client ignores it.
async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, JobClientError>
where
    F: Future<Output = Result<T, JobClientError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(JobClientError::Timeout))
}

async fn save_response(job: &JobRecord, kind: &str, raw: &str, ctx: &StageContext<'_>) {
    let path = ctx.paths.response_path(job, kind, Utc::now());
    if let Err(e) = ctx.artifacts.write_text(&path, raw).await {
        warn!("Failed to save {} response for job {}: {}", kind, job.id, e);
    }
}

fn log_body(body: Option<&str>) {
    let Some(body) = body else {
        return;
    };
    if body.chars().count() <= MAX_LOGGED_BODY {
        info!("Response body: {}", body);
    } else {
        let partial: String = body.chars().take(MAX_LOGGED_BODY).collect();
        info!("Response body too large to display. Partial response: {}", partial);
    }
}
