//! Types for external job client operations.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::{ExternalHandle, SubmitParams};

/// Errors that can occur talking to the external job API.
#[derive(Debug, Error)]
pub enum JobClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Invalid response: {reason}")]
    InvalidResponse {
        reason: String,
        status: u16,
        body: String,
    },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl JobClientError {
    /// HTTP status code of the response, if one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            JobClientError::UnexpectedStatus { status, .. }
            | JobClientError::InvalidResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw response body, if one was received.
    pub fn body(&self) -> Option<&str> {
        match self {
            JobClientError::UnexpectedStatus { body, .. }
            | JobClientError::InvalidResponse { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// An accepted job submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Identifier the external API assigned to the job.
    pub handle: ExternalHandle,
    /// Response body as received, kept for audit.
    pub raw_response: String,
}

/// Client for an external API that runs jobs asynchronously.
///
/// Every call takes the timeout it must respect. Implementations report a
/// timed-out request as [`JobClientError::Timeout`].
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Returns the name of this client implementation.
    fn name(&self) -> &str;

    /// Submit a job described by `params`.
    async fn submit(
        &self,
        params: &SubmitParams,
        timeout: Duration,
    ) -> Result<SubmitReceipt, JobClientError>;

    /// Completion fraction of a submitted job, nominally in `[0, 1]`.
    ///
    /// The value is returned as reported; range checking is the caller's job.
    async fn poll_status(
        &self,
        handle: &ExternalHandle,
        timeout: Duration,
    ) -> Result<f64, JobClientError>;

    /// Download the result of a completed job.
    async fn fetch_result(
        &self,
        handle: &ExternalHandle,
        timeout: Duration,
    ) -> Result<String, JobClientError>;
}
