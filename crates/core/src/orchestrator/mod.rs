//! Job orchestrator.
//!
//! Moves each open job one stage forward per batch:
//!
//! ```text
//! Queued -> Posted -> Downloaded -> Imported -> Completed
//!    \         \           \            \
//!     +---------+-----------+------------+--> Error
//! ```
//!
//! Posted jobs wait on the external system and are held until it reports
//! completion. Downloaded and Imported jobs only need local work, so a batch
//! that produces one asks for an immediate rerun.

mod config;
mod runner;
mod stages;
mod types;

pub use config::OrchestratorConfig;
pub use runner::JobOrchestrator;
pub use stages::Stage;
pub use types::{BatchReport, OrchestratorError, SessionReport, StageOutcome, Transition};
