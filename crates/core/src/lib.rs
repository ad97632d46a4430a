pub mod artifact;
pub mod client;
pub mod config;
pub mod job;
pub mod orchestrator;
pub mod testing;

pub use artifact::{ArtifactError, ArtifactPaths, ArtifactStore, FsArtifactStore};
pub use client::{HttpJobClient, JobClient, JobClientError, SubmitReceipt};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use job::{
    request_from_template, CreateJobRequest, JobDetail, JobId, JobRecord, JobStatus, JobStore,
    JobStoreError, JobTemplate, SqliteJobStore, TemplateError, TransitionRecord,
};
pub use orchestrator::{
    BatchReport, JobOrchestrator, OrchestratorConfig, OrchestratorError, SessionReport,
};
