//! Job orchestrator runner.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::config::OrchestratorConfig;
use super::stages::{Stage, StageContext};
use super::types::{BatchReport, OrchestratorError, SessionReport, StageOutcome};
use crate::artifact::{ArtifactPaths, ArtifactStore};
use crate::client::JobClient;
use crate::job::{JobRecord, JobStatus, JobStore};

/// Drives open jobs through their stages.
///
/// A batch makes one attempt per open job. A session repeats batches while
/// the previous one moved some job into a status that can progress without
/// waiting on the external system.
pub struct JobOrchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn JobStore>,
    client: Arc<dyn JobClient>,
    artifacts: Arc<dyn ArtifactStore>,
    paths: ArtifactPaths,
    save_submit_responses: bool,
}

impl JobOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn JobStore>,
        client: Arc<dyn JobClient>,
        artifacts: Arc<dyn ArtifactStore>,
        paths: ArtifactPaths,
    ) -> Self {
        Self {
            config,
            store,
            client,
            artifacts,
            paths,
            save_submit_responses: false,
        }
    }

    /// Keep the raw submit response of every job as an artifact.
    pub fn with_submit_responses(mut self, save: bool) -> Self {
        self.save_submit_responses = save;
        self
    }

    /// Run one pass over the open jobs.
    ///
    /// Only a failure to list the open jobs is returned as an error. Every
    /// other failure is confined to its job and counted in the report.
    pub async fn run_batch(&self) -> Result<BatchReport, OrchestratorError> {
        let jobs = self.store.list_open_jobs()?;
        let mut report = BatchReport {
            jobs_seen: jobs.len(),
            ..Default::default()
        };

        if jobs.is_empty() {
            info!("No jobs to process");
            return Ok(report);
        }
        info!("Found {} open jobs", jobs.len());

        let ctx = StageContext {
            store: self.store.as_ref(),
            client: self.client.as_ref(),
            artifacts: self.artifacts.as_ref(),
            paths: &self.paths,
            api_timeout: self.config.api_timeout(),
            save_submit_responses: self.save_submit_responses,
        };

        for job in &jobs {
            self.process_job(job, &ctx, &mut report).await;
        }

        debug!(?report, "batch finished");
        Ok(report)
    }

    /// Run batches until one reports nothing to rerun.
    ///
    /// Bounded by `max_passes_per_session`.
    pub async fn run_session(&self) -> Result<SessionReport, OrchestratorError> {
        let mut session = SessionReport::default();

        loop {
            let batch = self.run_batch().await?;
            session.record_pass(&batch);

            if !batch.rerun {
                break;
            }
            if session.passes >= self.config.max_passes_per_session {
                warn!(
                    "Stopping session after {} passes with jobs still able to progress",
                    session.passes
                );
                session.hit_pass_limit = true;
                break;
            }
            info!("Rerunning batch, some jobs can progress further");
        }

        info!(
            "Session finished after {} passes: {} transitions, {} failed, {} held",
            session.passes,
            session.totals.transitions,
            session.totals.failed,
            session.totals.held
        );
        Ok(session)
    }

    async fn process_job(&self, job: &JobRecord, ctx: &StageContext<'_>, report: &mut BatchReport) {
        info!(
            "Processing job {}: type = {}, as of = {}, status = {}",
            job.id, job.name, job.as_of, job.status_name
        );

        let status = match job.status() {
            Ok(status) => status,
            Err(e) => {
                error!("Job {} left untouched: {}", job.id, e);
                report.unhandled += 1;
                return;
            }
        };

        let Some(stage) = Stage::for_status(status) else {
            error!(
                "Job {} left untouched: no stage handles status {}",
                job.id, status
            );
            report.unhandled += 1;
            return;
        };

        match stage.run(job, ctx).await {
            StageOutcome::Transition(transition) => {
                if !transition.is_forward_from(status) {
                    error!(
                        "Job {} left untouched: {} stage attempted {} -> {}",
                        job.id,
                        stage.name(),
                        status,
                        transition.status()
                    );
                    report.violations += 1;
                    return;
                }

                match self.store.record_transition(job.id, transition.detail()) {
                    Ok(()) => {
                        info!("Job {}: {} -> {}", job.id, status, transition.status());
                        report.transitions += 1;
                        if transition.status() == JobStatus::Error {
                            report.failed += 1;
                        }
                        if transition.rerunnable() {
                            report.rerun = true;
                        }
                    }
                    Err(e) => {
                        error!(
                            "Failed to record {} -> {} for job {}: {}",
                            status,
                            transition.status(),
                            job.id,
                            e
                        );
                        report.write_failures += 1;
                    }
                }
            }
            StageOutcome::Hold { reason } => {
                info!("Job {} not ready: {}", job.id, reason);
                report.held += 1;
            }
            StageOutcome::Violation { reason } => {
                error!("Job {} left untouched: {}", job.id, reason);
                report.violations += 1;
            }
        }

        info!("Processing job {} complete", job.id);
    }
}
