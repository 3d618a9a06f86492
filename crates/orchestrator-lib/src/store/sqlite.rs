//! Structured record backend on SQLite
//!
//! All runs live in one `records` table keyed by id and indexed by owner and
//! record kind. The full run is kept as a JSON body; `project_id` and
//! `updated_at_ms` are lifted into columns for filtering and ordering.
//! Updates read the body, merge the patch and replace the whole row inside a
//! single transaction.

use super::{check_key, RunStore, StoreError};
use crate::models::{AnalysisRun, RunPatch, RUN_RECORD_KIND};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    id            TEXT PRIMARY KEY,
    owner_id      TEXT NOT NULL,
    kind          TEXT NOT NULL,
    project_id    TEXT,
    updated_at_ms INTEGER NOT NULL,
    body          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_records_owner_kind
    ON records (owner_id, kind, updated_at_ms DESC);
";

/// Run store over a single SQLite records table
#[derive(Clone)]
pub struct SqliteRunStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRunStore {
    /// Open (or create) a database file
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Task("connection mutex poisoned".to_string()))?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn load(conn: &Connection, owner_id: &str, run_id: &str) -> Result<AnalysisRun, StoreError> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM records WHERE id = ?1 AND owner_id = ?2 AND kind = ?3",
            params![run_id, owner_id, RUN_RECORD_KIND],
            |row| row.get(0),
        )
        .optional()?;

    match body {
        Some(body) => Ok(serde_json::from_str(&body)?),
        None => Err(StoreError::not_found(owner_id, run_id)),
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn create(&self, run: &AnalysisRun) -> Result<(), StoreError> {
        check_key(&run.owner_id)?;
        check_key(&run.id)?;
        let body = serde_json::to_string(run)?;
        let (id, owner_id, project_id) =
            (run.id.clone(), run.owner_id.clone(), run.project_id.clone());
        let updated_at_ms = run.updated_at.timestamp_millis();

        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO records (id, owner_id, kind, project_id, updated_at_ms, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, owner_id, RUN_RECORD_KIND, project_id, updated_at_ms, body],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::AlreadyExists {
                        owner_id,
                        run_id: id,
                    })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get(&self, owner_id: &str, run_id: &str) -> Result<AnalysisRun, StoreError> {
        let (owner_id, run_id) = (owner_id.to_string(), run_id.to_string());
        self.with_conn(move |conn| load(conn, &owner_id, &run_id)).await
    }

    async fn update(
        &self,
        owner_id: &str,
        run_id: &str,
        patch: RunPatch,
    ) -> Result<AnalysisRun, StoreError> {
        let (owner_id, run_id) = (owner_id.to_string(), run_id.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut run = load(&tx, &owner_id, &run_id)?;
            patch.apply(&mut run, Utc::now());

            let body = serde_json::to_string(&run)?;
            tx.execute(
                "UPDATE records SET project_id = ?1, updated_at_ms = ?2, body = ?3
                 WHERE id = ?4 AND owner_id = ?5 AND kind = ?6",
                params![
                    run.project_id,
                    run.updated_at.timestamp_millis(),
                    body,
                    run_id,
                    owner_id,
                    RUN_RECORD_KIND
                ],
            )?;
            tx.commit()?;

            debug!(run_id = %run_id, status = %run.status, "Run record replaced");
            Ok(run)
        })
        .await
    }

    async fn list(
        &self,
        owner_id: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<AnalysisRun>, StoreError> {
        let owner_id = owner_id.to_string();
        let project_id = project_id.map(str::to_string);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT body FROM records
                 WHERE owner_id = ?1 AND kind = ?2 AND (?3 IS NULL OR project_id = ?3)
                 ORDER BY updated_at_ms DESC, id ASC",
            )?;
            let bodies = stmt
                .query_map(params![owner_id, RUN_RECORD_KIND, project_id], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut runs = bodies
                .iter()
                .map(|body| serde_json::from_str(body))
                .collect::<Result<Vec<AnalysisRun>, _>>()?;
            // Millisecond columns can tie; order on the full timestamp
            super::sort_by_recency(&mut runs);
            Ok(runs)
        })
        .await
    }
}
