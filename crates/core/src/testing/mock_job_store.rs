//! Mock persistence gateway for testing.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::job::{
    JobDetail, JobId, JobRecord, JobStore, JobStoreError, RowCount, TransitionRecord,
};

#[derive(Debug, Default)]
struct MockStoreState {
    jobs: Vec<JobRecord>,
    history: Vec<TransitionRecord>,
    imports: Vec<(JobId, String)>,
    merges: Vec<(JobId, RowCount)>,
    fail_list: bool,
    fail_transitions: bool,
    import_result: Option<Result<u64, String>>,
    merge_result: Option<Result<u64, String>>,
}

/// In-memory implementation of the JobStore trait.
///
/// Unlike the SQLite store it accepts any status string, so unknown and
/// terminal statuses can be placed in the open-job set. Import and merge
/// succeed with the staged row count unless configured otherwise.
#[derive(Debug, Clone, Default)]
pub struct MockJobStore {
    state: Arc<Mutex<MockStoreState>>,
}

impl MockJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a job.
    pub fn insert(&self, job: JobRecord) {
        let mut state = self.lock();
        state.jobs.retain(|j| j.id != job.id);
        state.jobs.push(job);
        state.jobs.sort_by_key(|j| j.id);
    }

    /// Current state of a job.
    pub fn job(&self, id: JobId) -> Option<JobRecord> {
        self.lock().jobs.iter().find(|j| j.id == id).cloned()
    }

    /// Transitions recorded through the trait, oldest first.
    pub fn transitions(&self) -> Vec<TransitionRecord> {
        self.lock().history.clone()
    }

    /// `(job id, location)` of every staging import call.
    pub fn imports(&self) -> Vec<(JobId, String)> {
        self.lock().imports.clone()
    }

    /// `(job id, staged rows)` of every target merge call.
    pub fn merges(&self) -> Vec<(JobId, RowCount)> {
        self.lock().merges.clone()
    }

    /// Make `list_open_jobs` fail.
    pub fn set_fail_list(&self, fail: bool) {
        self.lock().fail_list = fail;
    }

    /// Make every `record_transition` fail.
    pub fn set_fail_transitions(&self, fail: bool) {
        self.lock().fail_transitions = fail;
    }

    /// Rows the staging import reports, or the error it fails with.
    pub fn set_import_result(&self, result: Result<u64, String>) {
        self.lock().import_result = Some(result);
    }

    /// Rows the target merge reports, or the error it fails with.
    pub fn set_merge_result(&self, result: Result<u64, String>) {
        self.lock().merge_result = Some(result);
    }

    fn lock(&self) -> MutexGuard<'_, MockStoreState> {
        // A panicking test thread must not hide the state from the others.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JobStore for MockJobStore {
    fn list_open_jobs(&self) -> Result<Vec<JobRecord>, JobStoreError> {
        let state = self.lock();
        if state.fail_list {
            return Err(JobStoreError::Database("mock list failure".to_string()));
        }
        Ok(state
            .jobs
            .iter()
            .filter(|j| !matches!(j.status(), Ok(s) if s.is_terminal()))
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<JobRecord>, JobStoreError> {
        Ok(self.lock().jobs.clone())
    }

    fn get(&self, id: JobId) -> Result<Option<JobRecord>, JobStoreError> {
        Ok(self.job(id))
    }

    fn record_transition(&self, id: JobId, detail: &JobDetail) -> Result<(), JobStoreError> {
        let mut state = self.lock();
        if state.fail_transitions {
            return Err(JobStoreError::Database("mock write failure".to_string()));
        }

        let now = Utc::now();
        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(JobStoreError::NotFound(id))?;
        let from_status = std::mem::replace(&mut job.status_name, detail.status().to_string());
        job.detail = detail.to_string();
        job.updated_at = now;

        state.history.push(TransitionRecord {
            job_id: id,
            from_status: Some(from_status),
            to_status: detail.status(),
            detail: detail.to_string(),
            recorded_at: now,
        });
        Ok(())
    }

    fn run_staging_import(
        &self,
        job: &JobRecord,
        location: &str,
    ) -> Result<RowCount, JobStoreError> {
        let mut state = self.lock();
        state.imports.push((job.id, location.to_string()));
        match state.import_result.clone().unwrap_or(Ok(1)) {
            Ok(rows) => Ok(RowCount(rows)),
            Err(reason) => Err(JobStoreError::Import(reason)),
        }
    }

    fn run_target_merge(
        &self,
        job: &JobRecord,
        staged: RowCount,
    ) -> Result<RowCount, JobStoreError> {
        let mut state = self.lock();
        state.merges.push((job.id, staged));
        match state.merge_result.clone() {
            None => Ok(staged),
            Some(Ok(rows)) => Ok(RowCount(rows)),
            Some(Err(reason)) => Err(JobStoreError::Merge(reason)),
        }
    }

    fn history(&self, id: JobId) -> Result<Vec<TransitionRecord>, JobStoreError> {
        Ok(self
            .lock()
            .history
            .iter()
            .filter(|t| t.job_id == id)
            .cloned()
            .collect())
    }
}
