//! SQLite-backed persistence gateway.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, error};

use super::{
    CreateJobRequest, JobDetail, JobId, JobRecord, JobStatus, JobStore, JobStoreError, RowCount,
    SubmitParams, TransitionRecord,
};

const AS_OF_FORMAT: &str = "%Y-%m-%d";

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const JOB_COLUMNS: &str = "id, name, as_of, status, detail, updated_at";

/// SQLite-backed job store.
///
/// Holds a single connection for its lifetime, so the connection is released
/// when the store is dropped. Besides the job queue it owns
/// three tables: `job_transitions` (audit trail), `staging_rows` (filled by
/// the import procedure) and `target_rows` (filled by the merge procedure).
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, JobStoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, JobStoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Set how long a statement waits on a locked database before failing.
    pub fn with_busy_timeout(self, timeout: Duration) -> Result<Self, JobStoreError> {
        self.lock()?.busy_timeout(timeout)?;
        Ok(self)
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                as_of TEXT NOT NULL,
                status TEXT NOT NULL,
                detail TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

            CREATE TABLE IF NOT EXISTS job_transitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id INTEGER NOT NULL REFERENCES jobs(id),
                from_status TEXT,
                to_status TEXT NOT NULL,
                detail TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_job_transitions_job_id ON job_transitions(job_id);

            CREATE TABLE IF NOT EXISTS staging_rows (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id INTEGER NOT NULL,
                row_index INTEGER NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_staging_rows_job_id ON staging_rows(job_id);

            CREATE TABLE IF NOT EXISTS target_rows (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_name TEXT NOT NULL,
                as_of TEXT NOT NULL,
                job_id INTEGER NOT NULL,
                row_index INTEGER NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_target_rows_name_as_of ON target_rows(job_name, as_of);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, JobStoreError> {
        self.conn
            .lock()
            .map_err(|_| JobStoreError::Database("connection mutex poisoned".to_string()))
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
        let as_of_str: String = row.get(2)?;
        let updated_at_str: String = row.get(5)?;

        let as_of = NaiveDate::parse_from_str(&as_of_str, AS_OF_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

        Ok(JobRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            as_of,
            status_name: row.get(3)?,
            detail: row.get(4)?,
            updated_at,
        })
    }

    fn query_jobs(conn: &Connection, where_clause: &str) -> Result<Vec<JobRecord>, JobStoreError> {
        let sql = format!(
            "SELECT {} FROM jobs {} ORDER BY id ASC",
            JOB_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let id: JobId = row.get(0)?;
            Ok((id, Self::row_to_job(row)))
        })?;

        // A row that cannot be read is reported and skipped so the rest of
        // the queue still moves.
        let mut jobs = Vec::new();
        for row in rows {
            match row? {
                (_, Ok(job)) => jobs.push(job),
                (id, Err(e)) => error!("Skipping unreadable job {}: {}", id, e),
            }
        }
        Ok(jobs)
    }

    /// Create a Queued job. This is the enqueuing side of the pipeline and is
    /// not used by the orchestrator.
    pub fn enqueue(&self, request: CreateJobRequest) -> Result<JobRecord, JobStoreError> {
        let submit_params = SubmitParams::parse(&request.params)
            .map_err(|e| JobStoreError::Database(format!("rejected job parameters: {}", e)))?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        let as_of = request.as_of.format(AS_OF_FORMAT).to_string();

        tx.execute(
            "INSERT INTO jobs (name, as_of, status, detail, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                request.name,
                as_of,
                JobStatus::Queued.as_str(),
                submit_params.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO job_transitions (job_id, from_status, to_status, detail, recorded_at) VALUES (?, NULL, ?, ?, ?)",
            params![id, JobStatus::Queued.as_str(), submit_params.as_str(), now.to_rfc3339()],
        )?;
        tx.commit()?;

        Ok(JobRecord {
            id,
            name: request.name,
            as_of: request.as_of,
            status_name: JobStatus::Queued.as_str().to_string(),
            detail: submit_params.as_str().to_string(),
            updated_at: now,
        })
    }

    /// Number of rows currently in the target table for a job type and date.
    pub fn target_row_count(&self, name: &str, as_of: NaiveDate) -> Result<u64, JobStoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM target_rows WHERE job_name = ? AND as_of = ?",
            params![name, as_of.format(AS_OF_FORMAT).to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Split a downloaded document into staging rows.
///
/// A top-level array yields one row per element, a document with a `data`
/// array yields one row per `data` element, anything else is a single row.
fn split_rows(document: Value) -> Vec<Value> {
    match document {
        Value::Array(rows) => rows,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => rows,
            Some(other) => {
                map.insert("data".to_string(), other);
                vec![Value::Object(map)]
            }
            None => vec![Value::Object(map)],
        },
        other => vec![other],
    }
}

impl JobStore for SqliteJobStore {
    fn list_open_jobs(&self) -> Result<Vec<JobRecord>, JobStoreError> {
        let conn = self.lock()?;
        Self::query_jobs(
            &conn,
            &format!(
                "WHERE status NOT IN ('{}', '{}')",
                JobStatus::Completed.as_str(),
                JobStatus::Error.as_str()
            ),
        )
    }

    fn list_all(&self) -> Result<Vec<JobRecord>, JobStoreError> {
        let conn = self.lock()?;
        Self::query_jobs(&conn, "")
    }

    fn get(&self, id: JobId) -> Result<Option<JobRecord>, JobStoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_job)
            .optional()?)
    }

    fn record_transition(&self, id: JobId, detail: &JobDetail) -> Result<(), JobStoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let from_status: Option<String> = tx
            .query_row("SELECT status FROM jobs WHERE id = ?", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        let Some(from_status) = from_status else {
            return Err(JobStoreError::NotFound(id));
        };

        let now = Utc::now().to_rfc3339();
        let to_status = detail.status();
        let detail = detail.to_string();

        tx.execute(
            "UPDATE jobs SET status = ?, detail = ?, updated_at = ? WHERE id = ?",
            params![to_status.as_str(), detail, now, id],
        )?;
        tx.execute(
            "INSERT INTO job_transitions (job_id, from_status, to_status, detail, recorded_at) VALUES (?, ?, ?, ?, ?)",
            params![id, from_status, to_status.as_str(), detail, now],
        )?;
        tx.commit()?;

        debug!(job_id = id, from = %from_status, to = %to_status, "transition recorded");
        Ok(())
    }

    fn run_staging_import(
        &self,
        job: &JobRecord,
        location: &str,
    ) -> Result<RowCount, JobStoreError> {
        let contents = std::fs::read_to_string(location)
            .map_err(|e| JobStoreError::Import(format!("cannot read {}: {}", location, e)))?;
        let document: Value = serde_json::from_str(&contents)
            .map_err(|e| JobStoreError::Import(format!("{} is not valid JSON: {}", location, e)))?;
        let rows = split_rows(document);

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM staging_rows WHERE job_id = ?", params![job.id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO staging_rows (job_id, row_index, payload) VALUES (?, ?, ?)",
            )?;
            for (idx, row) in rows.iter().enumerate() {
                stmt.execute(params![job.id, idx as i64, row.to_string()])?;
            }
        }
        tx.commit()?;

        Ok(RowCount(rows.len() as u64))
    }

    fn run_target_merge(
        &self,
        job: &JobRecord,
        staged: RowCount,
    ) -> Result<RowCount, JobStoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let actual: i64 = tx.query_row(
            "SELECT COUNT(*) FROM staging_rows WHERE job_id = ?",
            params![job.id],
            |row| row.get(0),
        )?;
        if actual as u64 != staged.0 {
            return Err(JobStoreError::Merge(format!(
                "job {} has {} staged rows, import reported {}",
                job.id, actual, staged
            )));
        }

        let as_of = job.as_of.format(AS_OF_FORMAT).to_string();
        tx.execute(
            "DELETE FROM target_rows WHERE job_name = ? AND as_of = ?",
            params![job.name, as_of],
        )?;
        let merged = tx.execute(
            "INSERT INTO target_rows (job_name, as_of, job_id, row_index, payload)
             SELECT ?, ?, job_id, row_index, payload FROM staging_rows WHERE job_id = ? ORDER BY row_index",
            params![job.name, as_of, job.id],
        )?;
        tx.execute("DELETE FROM staging_rows WHERE job_id = ?", params![job.id])?;
        tx.commit()?;

        Ok(RowCount(merged as u64))
    }

    fn history(&self, id: JobId) -> Result<Vec<TransitionRecord>, JobStoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT job_id, from_status, to_status, detail, recorded_at FROM job_transitions WHERE job_id = ? ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            let to_status: String = row.get(2)?;
            let recorded_at: String = row.get(4)?;
            Ok((
                row.get::<_, JobId>(0)?,
                row.get::<_, Option<String>>(1)?,
                to_status,
                row.get::<_, String>(3)?,
                recorded_at,
            ))
        })?;

        let mut history = Vec::new();
        for row in rows {
            let (job_id, from_status, to_status, detail, recorded_at) = row?;
            let to_status = to_status.parse::<JobStatus>().map_err(|e| {
                JobStoreError::InvalidRecord {
                    id: job_id,
                    reason: e.to_string(),
                }
            })?;
            let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| JobStoreError::InvalidRecord {
                    id: job_id,
                    reason: e.to_string(),
                })?;
            history.push(TransitionRecord {
                job_id,
                from_status,
                to_status,
                detail,
                recorded_at,
            });
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ArtifactLocation, ExternalHandle};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_store() -> SqliteJobStore {
        SqliteJobStore::in_memory().unwrap()
    }

    fn create_test_request(name: &str) -> CreateJobRequest {
        CreateJobRequest {
            name: name.to_string(),
            as_of: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            params: r#"{"data":{"type":"job","attributes":{"job_type":"PORTFOLIO_QUERY"}}}"#
                .to_string(),
        }
    }

    fn write_artifact(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn move_to_downloaded(store: &SqliteJobStore, id: JobId) {
        store
            .record_transition(id, &JobDetail::Posted(ExternalHandle::parse("42").unwrap()))
            .unwrap();
        store
            .record_transition(
                id,
                &JobDetail::Downloaded(ArtifactLocation::parse("/tmp/x.json").unwrap()),
            )
            .unwrap();
    }

    #[test]
    fn test_enqueue_creates_queued_job() {
        let store = create_test_store();
        let job = store.enqueue(create_test_request("Holdings")).unwrap();

        assert_eq!(job.status().unwrap(), JobStatus::Queued);
        assert_eq!(job.name, "Holdings");

        let fetched = store.get(job.id).unwrap().unwrap();
        assert_eq!(fetched.detail, job.detail);
        assert_eq!(fetched.as_of, job.as_of);
    }

    #[test]
    fn test_enqueue_rejects_invalid_params() {
        let store = create_test_store();
        let mut request = create_test_request("Holdings");
        request.params = "not json".to_string();
        assert!(store.enqueue(request).is_err());
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_list_open_jobs_excludes_terminal() {
        let store = create_test_store();
        let a = store.enqueue(create_test_request("Holdings")).unwrap();
        let b = store.enqueue(create_test_request("Accounts")).unwrap();
        let c = store.enqueue(create_test_request("Accounts")).unwrap();

        store
            .record_transition(b.id, &JobDetail::Error("boom".to_string()))
            .unwrap();
        store
            .record_transition(c.id, &JobDetail::Completed(RowCount(3)))
            .unwrap();

        let open: Vec<JobId> = store
            .list_open_jobs()
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(open, vec![a.id]);
        assert_eq!(store.list_all().unwrap().len(), 3);
    }

    #[test]
    fn test_record_transition_updates_and_audits() {
        let store = create_test_store();
        let job = store.enqueue(create_test_request("Holdings")).unwrap();

        store
            .record_transition(job.id, &JobDetail::Posted(ExternalHandle::parse("42").unwrap()))
            .unwrap();

        let fetched = store.get(job.id).unwrap().unwrap();
        assert_eq!(fetched.status().unwrap(), JobStatus::Posted);
        assert_eq!(fetched.detail, "42");

        let history = store.history(job.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].from_status, None);
        assert_eq!(history[0].to_status, JobStatus::Queued);
        assert_eq!(history[1].from_status.as_deref(), Some("Queued"));
        assert_eq!(history[1].to_status, JobStatus::Posted);
        assert_eq!(history[1].detail, "42");
    }

    #[test]
    fn test_record_transition_unknown_job() {
        let store = create_test_store();
        let err = store
            .record_transition(99, &JobDetail::Error("x".to_string()))
            .unwrap_err();
        assert!(matches!(err, JobStoreError::NotFound(99)));
    }

    #[test]
    fn test_staging_import_counts_array_rows() {
        let store = create_test_store();
        let job = store.enqueue(create_test_request("Holdings")).unwrap();
        let artifact = write_artifact(r#"[{"a":1},{"a":2},{"a":3}]"#);

        let rows = store
            .run_staging_import(&job, artifact.path().to_str().unwrap())
            .unwrap();
        assert_eq!(rows, RowCount(3));

        // Re-importing replaces rather than appends
        let rows = store
            .run_staging_import(&job, artifact.path().to_str().unwrap())
            .unwrap();
        assert_eq!(rows, RowCount(3));
        assert_eq!(store.run_target_merge(&job, RowCount(3)).unwrap(), RowCount(3));
    }

    #[test]
    fn test_staging_import_uses_data_array() {
        let store = create_test_store();
        let job = store.enqueue(create_test_request("Holdings")).unwrap();
        let artifact = write_artifact(r#"{"meta":{},"data":[{"id":"1"},{"id":"2"}]}"#);

        let rows = store
            .run_staging_import(&job, artifact.path().to_str().unwrap())
            .unwrap();
        assert_eq!(rows, RowCount(2));
    }

    #[test]
    fn test_staging_import_single_document() {
        let store = create_test_store();
        let job = store.enqueue(create_test_request("Holdings")).unwrap();
        let artifact = write_artifact(r#"{"data":{"attributes":{"total":{}}}}"#);

        let rows = store
            .run_staging_import(&job, artifact.path().to_str().unwrap())
            .unwrap();
        assert_eq!(rows, RowCount(1));
    }

    #[test]
    fn test_staging_import_missing_file_fails() {
        let store = create_test_store();
        let job = store.enqueue(create_test_request("Holdings")).unwrap();
        let err = store
            .run_staging_import(&job, "/nonexistent/Holdings_2024-03-31.json")
            .unwrap_err();
        assert!(matches!(err, JobStoreError::Import(_)));
    }

    #[test]
    fn test_staging_import_invalid_json_fails() {
        let store = create_test_store();
        let job = store.enqueue(create_test_request("Holdings")).unwrap();
        let artifact = write_artifact("<html>rate limited</html>");
        let err = store
            .run_staging_import(&job, artifact.path().to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, JobStoreError::Import(_)));
    }

    #[test]
    fn test_target_merge_moves_rows_and_replaces_previous() {
        let store = create_test_store();
        let first = store.enqueue(create_test_request("Holdings")).unwrap();
        let second = store.enqueue(create_test_request("Holdings")).unwrap();

        let artifact = write_artifact(r#"[1,2,3,4]"#);
        let path = artifact.path().to_str().unwrap();

        store.run_staging_import(&first, path).unwrap();
        store.run_target_merge(&first, RowCount(4)).unwrap();
        assert_eq!(store.target_row_count("Holdings", first.as_of).unwrap(), 4);

        let artifact = write_artifact(r#"[1,2]"#);
        store
            .run_staging_import(&second, artifact.path().to_str().unwrap())
            .unwrap();
        let merged = store.run_target_merge(&second, RowCount(2)).unwrap();
        assert_eq!(merged, RowCount(2));
        assert_eq!(store.target_row_count("Holdings", first.as_of).unwrap(), 2);
    }

    #[test]
    fn test_target_merge_rejects_count_mismatch() {
        let store = create_test_store();
        let job = store.enqueue(create_test_request("Holdings")).unwrap();
        move_to_downloaded(&store, job.id);
        let artifact = write_artifact(r#"[1,2,3]"#);
        store
            .run_staging_import(&job, artifact.path().to_str().unwrap())
            .unwrap();

        let err = store.run_target_merge(&job, RowCount(5)).unwrap_err();
        assert!(matches!(err, JobStoreError::Merge(_)));
        assert_eq!(store.target_row_count("Holdings", job.as_of).unwrap(), 0);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");

        let id = {
            let store = SqliteJobStore::new(&path).unwrap();
            store.enqueue(create_test_request("Accounts")).unwrap().id
        };

        let store = SqliteJobStore::new(&path)
            .unwrap()
            .with_busy_timeout(Duration::from_millis(250))
            .unwrap();
        let job = store.get(id).unwrap().unwrap();
        assert_eq!(job.name, "Accounts");
    }

    fn insert_unreadable_job(store: &SqliteJobStore) -> JobId {
        let conn = store.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO jobs (name, as_of, status, detail, created_at, updated_at) VALUES ('Broken', '03/31/2024', 'Queued', '{}', ?, ?)",
            params![now, now],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn test_list_open_jobs_skips_unreadable_row() {
        let store = create_test_store();
        let broken = insert_unreadable_job(&store);
        let good = store.enqueue(create_test_request("Holdings")).unwrap();

        let open: Vec<JobId> = store
            .list_open_jobs()
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(open, vec![good.id]);
        assert_ne!(broken, good.id);

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_row_does_not_block_batch() {
        use crate::artifact::ArtifactPaths;
        use crate::orchestrator::{JobOrchestrator, OrchestratorConfig};
        use crate::testing::{MockArtifactStore, MockJobClient};
        use std::sync::Arc;

        let store = Arc::new(create_test_store());
        insert_unreadable_job(&store);
        let good = store.enqueue(create_test_request("Holdings")).unwrap();

        let client = MockJobClient::new();
        client.push_handle("77").await;

        let orchestrator = JobOrchestrator::new(
            OrchestratorConfig::default(),
            store.clone(),
            Arc::new(client),
            Arc::new(MockArtifactStore::new()),
            ArtifactPaths::new("data", "logs"),
        );
        let report = orchestrator.run_batch().await.unwrap();

        assert_eq!(report.jobs_seen, 1);
        let job = store.get(good.id).unwrap().unwrap();
        assert_eq!(job.status().unwrap(), JobStatus::Posted);
        assert_eq!(job.detail, "77");
    }

    #[test]
    fn test_split_rows() {
        assert_eq!(split_rows(serde_json::json!([1, 2])).len(), 2);
        assert_eq!(split_rows(serde_json::json!({"data": [1, 2, 3]})).len(), 3);
        assert_eq!(split_rows(serde_json::json!({"data": {"x": 1}})).len(), 1);
        assert_eq!(split_rows(serde_json::json!("scalar")).len(), 1);
    }
}
