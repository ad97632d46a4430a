//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the job orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Timeout applied to every external API call (seconds).
    #[serde(default = "default_api_timeout")]
    pub api_timeout_secs: u64,

    /// Upper bound on batch passes in one session.
    /// A session normally stops as soon as a pass leaves nothing to rerun.
    #[serde(default = "default_max_passes")]
    pub max_passes_per_session: u32,

    /// Delay between sessions in watch mode (seconds).
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,
}

fn default_api_timeout() -> u64 {
    300 // 5 minutes
}

fn default_max_passes() -> u32 {
    32
}

fn default_watch_interval() -> u64 {
    900 // 15 minutes
}

impl OrchestratorConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            api_timeout_secs: default_api_timeout(),
            max_passes_per_session: default_max_passes(),
            watch_interval_secs: default_watch_interval(),
        }
    }
}
