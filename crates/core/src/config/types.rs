use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::job::JobTemplate;
use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Request bodies per job type, used by `enqueue`
    #[serde(default)]
    pub templates: BTreeMap<String, JobTemplate>,
}

/// External job API configuration.
///
/// Built once at startup and handed to the HTTP client by value.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Jobs endpoint (e.g., "https://firm.example.com/api/v1/jobs")
    pub base_url: String,
    /// API key (basic auth username)
    pub key: String,
    /// API secret (basic auth password)
    #[serde(default)]
    pub secret: String,
    /// Extra headers sent with every request (e.g., "X-Firm-Id").
    /// Entries override the JSON:API defaults by name, ignoring case.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ApiConfig {
    /// Default headers merged with the configured ones.
    pub fn effective_headers(&self) -> BTreeMap<String, String> {
        let mut headers = default_headers();
        for (name, value) in &self.headers {
            headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
            headers.insert(name.clone(), value.clone());
        }
        headers
    }
}

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "Accept".to_string(),
            "application/vnd.api+json".to_string(),
        ),
        (
            "Content-Type".to_string(),
            "application/vnd.api+json".to_string(),
        ),
    ])
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// How long a statement waits on a locked database (milliseconds)
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("jobline.db")
}

fn default_busy_timeout() -> u64 {
    5000
}

/// Where downloaded payloads and raw API responses are written
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactConfig {
    /// Downloaded job results
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Raw submit responses
    #[serde(default = "default_response_dir")]
    pub response_dir: PathBuf,
    /// Keep a copy of every submit response
    #[serde(default = "default_true")]
    pub save_submit_responses: bool,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            response_dir: default_response_dir(),
            save_submit_responses: true,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_response_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_true() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
    /// Also write a log file per run into this directory
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Prefix of per-run log file names
    #[serde(default = "default_project")]
    pub project: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            dir: None,
            project: default_project(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_project() -> String {
    "jobline".to_string()
}

/// Sanitized config for display (secret redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub api: SanitizedApiConfig,
    pub database: DatabaseConfig,
    pub artifacts: ArtifactConfig,
    pub orchestrator: OrchestratorConfig,
    pub logging: LoggingConfig,
    pub templates: Vec<String>,
}

/// Sanitized API config (secret hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedApiConfig {
    pub base_url: String,
    pub key: String,
    pub secret_configured: bool,
    pub headers: BTreeMap<String, String>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            api: SanitizedApiConfig {
                base_url: config.api.base_url.clone(),
                key: config.api.key.clone(),
                secret_configured: !config.api.secret.is_empty(),
                headers: config.api.effective_headers(),
            },
            database: config.database.clone(),
            artifacts: config.artifacts.clone(),
            orchestrator: config.orchestrator.clone(),
            logging: config.logging.clone(),
            templates: config.templates.keys().cloned().collect(),
        }
    }
}
