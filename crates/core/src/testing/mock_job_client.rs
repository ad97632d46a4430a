//! Mock external job client for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::client::{JobClient, JobClientError, SubmitReceipt};
use crate::job::{ExternalHandle, SubmitParams};

/// Operation kinds exposed by [`JobClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientOp {
    Submit,
    PollStatus,
    FetchResult,
}

/// A recorded client call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub op: ClientOp,
    /// Submit parameters, or the handle for poll/fetch.
    pub argument: String,
    /// Timeout the caller passed.
    pub timeout: Duration,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Mock implementation of the JobClient trait.
///
/// Provides controllable behavior for testing:
/// - Assign handles to submitted jobs
/// - Control per-handle completion fraction and result payload
/// - Inject failures per operation
/// - Delay responses to exercise timeouts
///
/// # Example
///
/// ```rust,ignore
/// let client = MockJobClient::new();
///
/// // First submit is accepted as "job-1"
/// client.set_progress("job-1", 0.5).await;
/// client.set_result("job-1", r#"[{"id":1}]"#).await;
///
/// // Next status query fails
/// client.fail_next(ClientOp::PollStatus, JobClientError::Timeout).await;
/// ```
#[derive(Debug, Clone)]
pub struct MockJobClient {
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    /// Completion fraction by handle. Unknown handles report 0.0.
    progress: Arc<RwLock<HashMap<String, f64>>>,
    /// Result payload by handle. Unknown handles return `[]`.
    results: Arc<RwLock<HashMap<String, String>>>,
    /// Pending failures, consumed in order per operation.
    failures: Arc<RwLock<Vec<(ClientOp, JobClientError)>>>,
    /// Handles to assign to the next submits, before generated ones.
    next_handles: Arc<RwLock<Vec<String>>>,
    handle_counter: Arc<RwLock<u32>>,
    delay: Arc<RwLock<Option<Duration>>>,
}

impl Default for MockJobClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockJobClient {
    /// Create a new mock job client.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            progress: Arc::new(RwLock::new(HashMap::new())),
            results: Arc::new(RwLock::new(HashMap::new())),
            failures: Arc::new(RwLock::new(Vec::new())),
            next_handles: Arc::new(RwLock::new(Vec::new())),
            handle_counter: Arc::new(RwLock::new(0)),
            delay: Arc::new(RwLock::new(None)),
        }
    }

    /// Get all recorded calls.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Get recorded calls of one kind.
    pub async fn calls_of(&self, op: ClientOp) -> Vec<RecordedCall> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.op == op)
            .cloned()
            .collect()
    }

    /// Set the completion fraction reported for a handle.
    ///
    /// Not clamped, so out-of-range and NaN values can be tested.
    pub async fn set_progress(&self, handle: &str, fraction: f64) {
        self.progress
            .write()
            .await
            .insert(handle.to_string(), fraction);
    }

    /// Set the payload returned when downloading a handle's result.
    pub async fn set_result(&self, handle: &str, payload: impl Into<String>) {
        self.results
            .write()
            .await
            .insert(handle.to_string(), payload.into());
    }

    /// Assign `handle` to the next accepted submit.
    pub async fn push_handle(&self, handle: impl Into<String>) {
        self.next_handles.write().await.push(handle.into());
    }

    /// Configure the next call of `op` to fail with `error`.
    pub async fn fail_next(&self, op: ClientOp, error: JobClientError) {
        self.failures.write().await.push((op, error));
    }

    /// Delay every response by `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    async fn begin(
        &self,
        op: ClientOp,
        argument: &str,
        timeout: Duration,
    ) -> Result<(), JobClientError> {
        self.calls.write().await.push(RecordedCall {
            op,
            argument: argument.to_string(),
            timeout,
            timestamp: Utc::now(),
        });

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut failures = self.failures.write().await;
        match failures.iter().position(|(o, _)| *o == op) {
            Some(idx) => Err(failures.remove(idx).1),
            None => Ok(()),
        }
    }

    async fn next_handle(&self) -> String {
        let mut queued = self.next_handles.write().await;
        if !queued.is_empty() {
            return queued.remove(0);
        }
        let mut counter = self.handle_counter.write().await;
        *counter += 1;
        format!("job-{}", *counter)
    }
}

#[async_trait]
impl JobClient for MockJobClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(
        &self,
        params: &SubmitParams,
        timeout: Duration,
    ) -> Result<SubmitReceipt, JobClientError> {
        self.begin(ClientOp::Submit, params.as_str(), timeout)
            .await?;

        let handle = self.next_handle().await;
        let raw_response = format!(r#"{{"data":{{"id":"{}","type":"jobs"}}}}"#, handle);
        let handle = ExternalHandle::parse(&handle).map_err(|e| JobClientError::InvalidResponse {
            reason: e.to_string(),
            status: 202,
            body: raw_response.clone(),
        })?;

        Ok(SubmitReceipt {
            handle,
            raw_response,
        })
    }

    async fn poll_status(
        &self,
        handle: &ExternalHandle,
        timeout: Duration,
    ) -> Result<f64, JobClientError> {
        self.begin(ClientOp::PollStatus, handle.as_str(), timeout)
            .await?;
        Ok(self
            .progress
            .read()
            .await
            .get(handle.as_str())
            .copied()
            .unwrap_or(0.0))
    }

    async fn fetch_result(
        &self,
        handle: &ExternalHandle,
        timeout: Duration,
    ) -> Result<String, JobClientError> {
        self.begin(ClientOp::FetchResult, handle.as_str(), timeout)
            .await?;
        Ok(self
            .results
            .read()
            .await
            .get(handle.as_str())
            .cloned()
            .unwrap_or_else(|| "[]".to_string()))
    }
}
