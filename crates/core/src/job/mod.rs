//! Job records, their status-dependent detail, and the persistence gateway.

mod detail;
mod sqlite_store;
mod store;
mod template;
mod types;

pub use detail::{
    ArtifactLocation, DetailError, ExternalHandle, JobDetail, RowCount, SubmitParams,
};
pub use sqlite_store::SqliteJobStore;
pub use store::{CreateJobRequest, JobStore, JobStoreError, TransitionRecord};
pub use template::{
    request_from_template, JobTemplate, TemplateError, END_DATE_PLACEHOLDER,
    START_DATE_PLACEHOLDER,
};
pub use types::{JobId, JobRecord, JobStatus, UnknownStatus};
