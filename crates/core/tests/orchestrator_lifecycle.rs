//! Orchestrator lifecycle integration tests.
//!
//! These tests drive jobs through the complete lifecycle against a real
//! SQLite store and the filesystem, with only the remote API mocked:
//! queued -> posted -> downloaded -> imported -> completed

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::TempDir;

use jobline_core::{
    testing::{fixtures, ClientOp, MockJobClient},
    ArtifactPaths, CreateJobRequest, FsArtifactStore, JobClientError, JobOrchestrator, JobRecord,
    JobStatus, JobStore, OrchestratorConfig, SqliteJobStore,
};

/// Test helper wiring a SQLite store, the filesystem and a mock client.
struct TestHarness {
    store: Arc<SqliteJobStore>,
    client: MockJobClient,
    db_path: PathBuf,
    data_dir: PathBuf,
    response_dir: PathBuf,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("jobline.db");

        let store = Arc::new(SqliteJobStore::new(&db_path).expect("Failed to create job store"));

        Self {
            store,
            client: MockJobClient::new(),
            db_path,
            data_dir: temp_dir.path().join("data"),
            response_dir: temp_dir.path().join("logs"),
            _temp_dir: temp_dir,
        }
    }

    fn create_orchestrator(&self) -> JobOrchestrator {
        self.orchestrator_over(self.store.clone())
    }

    /// Orchestrator over a fresh connection, as the binary opens per session.
    fn session_orchestrator(&self) -> JobOrchestrator {
        let store = SqliteJobStore::new(&self.db_path).expect("Failed to reopen job store");
        self.orchestrator_over(Arc::new(store))
    }

    fn orchestrator_over(&self, store: Arc<SqliteJobStore>) -> JobOrchestrator {
        JobOrchestrator::new(
            OrchestratorConfig::default(),
            store,
            Arc::new(self.client.clone()),
            Arc::new(FsArtifactStore::new()),
            ArtifactPaths::new(&self.data_dir, &self.response_dir),
        )
        .with_submit_responses(true)
    }

    fn enqueue(&self, name: &str) -> JobRecord {
        self.store
            .enqueue(CreateJobRequest {
                name: name.to_string(),
                as_of: fixtures::as_of(),
                params: fixtures::submit_params(name),
            })
            .expect("Failed to enqueue job")
    }

    fn status(&self, job: &JobRecord) -> JobStatus {
        self.store
            .get(job.id)
            .expect("Failed to read job")
            .expect("Job disappeared")
            .status()
            .expect("Stored status is unknown")
    }

    fn detail(&self, job: &JobRecord) -> String {
        self.store
            .get(job.id)
            .expect("Failed to read job")
            .expect("Job disappeared")
            .detail
    }
}

#[tokio::test]
async fn test_full_lifecycle_across_sessions() {
    let harness = TestHarness::new();
    let holdings = harness.enqueue("Holdings");
    let accounts = harness.enqueue("Accounts");
    harness.client.push_handle("101").await;
    harness.client.push_handle("102").await;

    let orchestrator = harness.create_orchestrator();

    // Session 1: both jobs are submitted and must wait on the remote side.
    let session = orchestrator.run_session().await.unwrap();
    assert_eq!(session.passes, 1);
    assert_eq!(session.totals.transitions, 2);
    assert_eq!(harness.status(&holdings), JobStatus::Posted);
    assert_eq!(harness.detail(&holdings), "101");
    assert_eq!(harness.detail(&accounts), "102");

    // Session 2: Holdings finished remotely, Accounts is still running.
    harness.client.set_progress("101", 1.0).await;
    harness
        .client
        .set_result("101", r#"{"data":[{"id":1},{"id":2},{"id":3}]}"#)
        .await;
    harness.client.set_progress("102", 0.4).await;

    let session = orchestrator.run_session().await.unwrap();
    assert_eq!(session.passes, 3);
    assert!(!session.hit_pass_limit);
    assert_eq!(harness.status(&holdings), JobStatus::Completed);
    assert_eq!(harness.detail(&holdings), "3");
    assert_eq!(harness.status(&accounts), JobStatus::Posted);

    let rows = harness
        .store
        .target_row_count("Holdings", fixtures::as_of())
        .unwrap();
    assert_eq!(rows, 3);

    let data_file = harness.data_dir.join("Holdings_2024-03-31.json");
    assert!(data_file.exists());

    let statuses: Vec<JobStatus> = harness
        .store
        .history(holdings.id)
        .unwrap()
        .into_iter()
        .map(|t| t.to_status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            JobStatus::Queued,
            JobStatus::Posted,
            JobStatus::Downloaded,
            JobStatus::Imported,
            JobStatus::Completed,
        ]
    );

    let open: Vec<i64> = harness
        .store
        .list_open_jobs()
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(open, vec![accounts.id]);

    // Accounts is still polled on later sessions, never downloaded early.
    assert_eq!(harness.client.calls_of(ClientOp::FetchResult).await.len(), 1);
}

#[tokio::test]
async fn test_submit_responses_written_to_response_dir() {
    let harness = TestHarness::new();
    harness.enqueue("Holdings");

    harness.create_orchestrator().run_session().await.unwrap();

    let entries: Vec<String> = std::fs::read_dir(&harness.response_dir)
        .expect("Response directory was not created")
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].starts_with("Holdings_2024-03-31_SubmitResponse_"));
    assert!(entries[0].ends_with(".txt"));
}

#[tokio::test]
async fn test_rerun_replaces_target_rows() {
    let harness = TestHarness::new();
    let first = harness.enqueue("Holdings");
    harness.client.push_handle("201").await;
    harness.client.set_progress("201", 1.0).await;
    harness
        .client
        .set_result("201", r#"[{"id":1},{"id":2},{"id":3},{"id":4}]"#)
        .await;

    let orchestrator = harness.create_orchestrator();
    orchestrator.run_session().await.unwrap();
    orchestrator.run_session().await.unwrap();
    assert_eq!(harness.status(&first), JobStatus::Completed);

    // Same job type and date, smaller result set.
    let second = harness.enqueue("Holdings");
    harness.client.push_handle("202").await;
    harness.client.set_progress("202", 1.0).await;
    harness.client.set_result("202", r#"[{"id":1}]"#).await;

    orchestrator.run_session().await.unwrap();
    orchestrator.run_session().await.unwrap();
    assert_eq!(harness.status(&second), JobStatus::Completed);

    let rows = harness
        .store
        .target_row_count("Holdings", fixtures::as_of())
        .unwrap();
    assert_eq!(rows, 1);

    // Other dates are untouched by the replacement.
    let other_date = NaiveDate::from_ymd_opt(2024, 4, 30).unwrap();
    assert_eq!(
        harness
            .store
            .target_row_count("Holdings", other_date)
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_unparseable_download_fails_import() {
    let harness = TestHarness::new();
    let job = harness.enqueue("Holdings");
    harness.client.push_handle("301").await;
    harness.client.set_progress("301", 1.0).await;
    harness.client.set_result("301", "<html>oops</html>").await;

    let orchestrator = harness.create_orchestrator();
    orchestrator.run_session().await.unwrap();
    let session = orchestrator.run_session().await.unwrap();

    assert_eq!(harness.status(&job), JobStatus::Error);
    assert!(harness.detail(&job).starts_with("Failure importing data"));
    assert_eq!(session.totals.failed, 1);

    // Error is terminal: later sessions leave it alone.
    let session = orchestrator.run_session().await.unwrap();
    assert_eq!(session.totals.jobs_seen, 0);
    assert_eq!(harness.status(&job), JobStatus::Error);
}

#[tokio::test]
async fn test_rejected_submit_records_error() {
    let harness = TestHarness::new();
    let rejected = harness.enqueue("Holdings");
    let accepted = harness.enqueue("Accounts");
    harness
        .client
        .fail_next(
            ClientOp::Submit,
            JobClientError::UnexpectedStatus {
                status: 400,
                body: r#"{"errors":[{"detail":"unknown view"}]}"#.to_string(),
            },
        )
        .await;

    let session = harness.create_orchestrator().run_session().await.unwrap();

    assert_eq!(session.totals.failed, 1);
    assert_eq!(harness.status(&rejected), JobStatus::Error);
    assert_eq!(
        harness.detail(&rejected),
        "Failure posting job - see logs for details."
    );
    assert_eq!(harness.status(&accepted), JobStatus::Posted);
}

#[tokio::test]
async fn test_sessions_on_separate_connections() {
    let harness = TestHarness::new();
    let job = harness.enqueue("Holdings");
    harness.client.push_handle("401").await;
    harness.client.set_progress("401", 1.0).await;
    harness.client.set_result("401", r#"[{"id":1},{"id":2}]"#).await;

    {
        let session = harness.session_orchestrator().run_session().await.unwrap();
        assert_eq!(session.totals.transitions, 1);
    }
    assert_eq!(harness.status(&job), JobStatus::Posted);

    let session = harness.session_orchestrator().run_session().await.unwrap();
    assert_eq!(session.passes, 3);
    assert_eq!(harness.status(&job), JobStatus::Completed);
    assert_eq!(
        harness
            .store
            .target_row_count("Holdings", fixtures::as_of())
            .unwrap(),
        2
    );
}
