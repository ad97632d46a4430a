//! HTTP client for a JSON:API style jobs endpoint.
//!
//! - `POST {base}` submits a job; the API answers 202 with `data.id`.
//! - `GET {base}/{id}` reports `data.attributes.percent_complete`. The API
//!   answers 200 while running and 303 (redirect to the result) once done, so
//!   redirects are not followed here.
//! - `GET {base}/{id}/download` returns the result body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect, Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ApiConfig;
use crate::job::{ExternalHandle, SubmitParams};

use super::{JobClient, JobClientError, SubmitReceipt};

/// HTTP implementation of [`JobClient`].
pub struct HttpJobClient {
    /// Follows redirects; used for submit and download.
    client: Client,
    /// Does not follow redirects; used for status queries.
    status_client: Client,
    config: ApiConfig,
}

impl HttpJobClient {
    /// Create a new client. Headers and credentials are fixed for its lifetime.
    pub fn new(config: ApiConfig) -> Result<Self, JobClientError> {
        let headers = Self::default_headers(&config)?;

        let client = Client::builder()
            .default_headers(headers.clone())
            .build()
            .map_err(|e| JobClientError::InvalidConfig(e.to_string()))?;

        let status_client = Client::builder()
            .default_headers(headers)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| JobClientError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            status_client,
            config,
        })
    }

    fn default_headers(config: &ApiConfig) -> Result<HeaderMap, JobClientError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.effective_headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| JobClientError::InvalidConfig(format!("header {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| JobClientError::InvalidConfig(format!("header {}: {}", name, e)))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn job_url(&self, handle: &ExternalHandle) -> String {
        format!(
            "{}/{}",
            self.base_url(),
            urlencoding::encode(handle.as_str())
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.config.key, Some(&self.config.secret))
    }

    /// Send a request and read its body.
    async fn send(
        &self,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<(StatusCode, String), JobClientError> {
        let response = self
            .authorize(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;
        Ok((status, body))
    }
}

fn map_transport_error(e: reqwest::Error) -> JobClientError {
    if e.is_timeout() {
        JobClientError::Timeout
    } else if e.is_connect() {
        JobClientError::ConnectionFailed(e.to_string())
    } else {
        JobClientError::ApiError(e.to_string())
    }
}

fn parse_json(status: StatusCode, body: &str) -> Result<Value, JobClientError> {
    serde_json::from_str(body).map_err(|e| JobClientError::InvalidResponse {
        reason: format!("body is not valid JSON: {}", e),
        status: status.as_u16(),
        body: body.to_string(),
    })
}

fn missing_field(status: StatusCode, body: &str, field: &str) -> JobClientError {
    JobClientError::InvalidResponse {
        reason: format!("missing field `{}`", field),
        status: status.as_u16(),
        body: body.to_string(),
    }
}

fn unexpected_status(status: StatusCode, body: String) -> JobClientError {
    JobClientError::UnexpectedStatus {
        status: status.as_u16(),
        body,
    }
}

/// Extract the job handle from a submit response. Only 202 Accepted counts.
pub(crate) fn parse_submit_response(
    status: StatusCode,
    body: &str,
) -> Result<ExternalHandle, JobClientError> {
    if status != StatusCode::ACCEPTED {
        return Err(unexpected_status(status, body.to_string()));
    }

    let json = parse_json(status, body)?;
    let id = match json.pointer("/data/id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(missing_field(status, body, "data.id")),
    };

    ExternalHandle::parse(&id).map_err(|e| JobClientError::InvalidResponse {
        reason: e.to_string(),
        status: status.as_u16(),
        body: body.to_string(),
    })
}

/// Extract the completion fraction from a status response (200 or 303).
pub(crate) fn parse_status_response(status: StatusCode, body: &str) -> Result<f64, JobClientError> {
    if status != StatusCode::OK && status != StatusCode::SEE_OTHER {
        return Err(unexpected_status(status, body.to_string()));
    }

    let json = parse_json(status, body)?;
    json.pointer("/data/attributes/percent_complete")
        .and_then(Value::as_f64)
        .ok_or_else(|| missing_field(status, body, "data.attributes.percent_complete"))
}

#[async_trait]
impl JobClient for HttpJobClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(
        &self,
        params: &SubmitParams,
        timeout: Duration,
    ) -> Result<SubmitReceipt, JobClientError> {
        let request = self
            .client
            .post(self.base_url())
            .body(params.as_str().to_string());
        let (status, body) = self.send(request, timeout).await?;
        info!("Job posted. HTTP response code = {}", status.as_u16());

        let handle = parse_submit_response(status, &body)?;
        Ok(SubmitReceipt {
            handle,
            raw_response: body,
        })
    }

    async fn poll_status(
        &self,
        handle: &ExternalHandle,
        timeout: Duration,
    ) -> Result<f64, JobClientError> {
        let request = self.status_client.get(self.job_url(handle));
        let (status, body) = self.send(request, timeout).await?;
        info!(
            "Job {} status queried. HTTP response code = {}",
            handle.as_str(),
            status.as_u16()
        );

        let fraction = parse_status_response(status, &body)?;
        debug!("Job {} percent complete = {} / 1.000", handle.as_str(), fraction);
        Ok(fraction)
    }

    async fn fetch_result(
        &self,
        handle: &ExternalHandle,
        timeout: Duration,
    ) -> Result<String, JobClientError> {
        let request = self
            .client
            .get(format!("{}/download", self.job_url(handle)));
        let (status, body) = self.send(request, timeout).await?;
        info!(
            "Job {} downloaded. HTTP response code = {}",
            handle.as_str(),
            status.as_u16()
        );

        if status != StatusCode::OK {
            return Err(unexpected_status(status, body));
        }
        Ok(body)
    }
}
