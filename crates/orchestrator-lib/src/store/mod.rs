//! Durable persistence for analysis runs
//!
//! This module provides:
//! - The `RunStore` trait the orchestrator depends on
//! - A per-owner JSON file backend
//! - A structured record backend on SQLite
//!
//! Backends hold no business logic; they persist, merge patches and sort.

mod file;
mod sqlite;


pub use file::FileRunStore;
pub use sqlite::SqliteRunStore;

use crate::models::{AnalysisRun, RunPatch};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by run store backends
#[derive(Debug, Error)]
pub enum StoreError {
    /// No run with this id exists for this owner
    #[error("run not found: {owner_id}/{run_id}")]
    NotFound { owner_id: String, run_id: String },

    #[error("run already exists: {owner_id}/{run_id}")]
    AlreadyExists { owner_id: String, run_id: String },

    /// Identifier cannot be used as a storage key
    #[error("invalid identifier '{0}'")]
    InvalidKey(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub fn not_found(owner_id: &str, run_id: &str) -> Self {
        StoreError::NotFound {
            owner_id: owner_id.to_string(),
            run_id: run_id.to_string(),
        }
    }

    /// Absence, as opposed to a failure of the store itself
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Persistence operations over analysis runs
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a new run
    async fn create(&self, run: &AnalysisRun) -> Result<(), StoreError>;

    /// Fetch a run owned by `owner_id`
    async fn get(&self, owner_id: &str, run_id: &str) -> Result<AnalysisRun, StoreError>;

    /// Merge `patch` into an existing run and return the updated record
    async fn update(
        &self,
        owner_id: &str,
        run_id: &str,
        patch: RunPatch,
    ) -> Result<AnalysisRun, StoreError>;

    /// Runs for an owner, most recently updated first
    async fn list(
        &self,
        owner_id: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<AnalysisRun>, StoreError>;
}

/// Backend selection, decided once at startup
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreBackend {
    /// One JSON document per run under `<base_dir>/<owner_id>/`
    File { base_dir: PathBuf },
    /// Single records table in a SQLite database file
    Sqlite { path: PathBuf },
}

/// Open the configured backend
pub async fn open_store(backend: &StoreBackend) -> Result<Arc<dyn RunStore>, StoreError> {
    match backend {
        StoreBackend::File { base_dir } => {
            tracing::info!(base_dir = %base_dir.display(), "Using file run store");
            Ok(Arc::new(FileRunStore::open(base_dir.clone()).await?))
        }
        StoreBackend::Sqlite { path } => {
            tracing::info!(path = %path.display(), "Using SQLite run store");
            Ok(Arc::new(SqliteRunStore::open(path)?))
        }
    }
}

/// Reject identifiers that cannot safely become a path component or key
pub(crate) fn check_key(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && id.len() <= 255
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(id.to_string()))
    }
}

/// Most recently updated first; ties broken by id for a stable order
pub(crate) fn sort_by_recency(runs: &mut [AnalysisRun]) {
    runs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
}
