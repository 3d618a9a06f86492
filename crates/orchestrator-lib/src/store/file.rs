//! Per-owner JSON file backend
//!
//! Layout: `<base_dir>/<owner_id>/<run_id>.json`, one full run record per
//! file. Writes go through a temp file and rename so a crash never leaves a
//! half-written record behind.

use super::{check_key, sort_by_recency, RunStore, StoreError};
use crate::models::{AnalysisRun, RunPatch};
use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const RECORD_EXTENSION: &str = "json";

/// Run store keeping one JSON document per run on local disk
pub struct FileRunStore {
    base_dir: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl FileRunStore {
    /// Open a store rooted at `base_dir`, creating it if needed
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| io_error(&base_dir, e))?;
        Ok(Self {
            base_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn owner_dir(&self, owner_id: &str) -> Result<PathBuf, StoreError> {
        check_key(owner_id)?;
        Ok(self.base_dir.join(owner_id))
    }

    fn run_path(&self, owner_id: &str, run_id: &str) -> Result<PathBuf, StoreError> {
        check_key(run_id)?;
        Ok(self
            .owner_dir(owner_id)?
            .join(format!("{}.{}", run_id, RECORD_EXTENSION)))
    }

    async fn read_run(&self, owner_id: &str, run_id: &str) -> Result<AnalysisRun, StoreError> {
        let path = self.run_path(owner_id, run_id)?;
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::not_found(owner_id, run_id))
            }
            Err(e) => return Err(io_error(&path, e)),
        };
        Ok(serde_json::from_slice(&data)?)
    }

    async fn write_run(&self, run: &AnalysisRun) -> Result<(), StoreError> {
        let dir = self.owner_dir(&run.owner_id)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;

        let path = self.run_path(&run.owner_id, &run.id)?;
        let json = serde_json::to_vec_pretty(run)?;

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| io_error(&temp_path, e))?;
        file.write_all(&json)
            .await
            .map_err(|e| io_error(&temp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| io_error(&temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        debug!(path = %path.display(), status = %run.status, "Run record written");
        Ok(())
    }
}

#[async_trait]
impl RunStore for FileRunStore {
    async fn create(&self, run: &AnalysisRun) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.run_path(&run.owner_id, &run.id)?;
        if fs::try_exists(&path).await.map_err(|e| io_error(&path, e))? {
            return Err(StoreError::AlreadyExists {
                owner_id: run.owner_id.clone(),
                run_id: run.id.clone(),
            });
        }
        self.write_run(run).await
    }

    async fn get(&self, owner_id: &str, run_id: &str) -> Result<AnalysisRun, StoreError> {
        self.read_run(owner_id, run_id).await
    }

    async fn update(
        &self,
        owner_id: &str,
        run_id: &str,
        patch: RunPatch,
    ) -> Result<AnalysisRun, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut run = self.read_run(owner_id, run_id).await?;
        patch.apply(&mut run, Utc::now());
        self.write_run(&run).await?;
        Ok(run)
    }

    async fn list(
        &self,
        owner_id: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<AnalysisRun>, StoreError> {
        let dir = self.owner_dir(owner_id)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir, e)),
        };

        let mut runs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }

            let data = match fs::read(&path).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable run record");
                    continue;
                }
            };
            let run: AnalysisRun = match serde_json::from_slice(&data) {
                Ok(run) => run,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping malformed run record");
                    continue;
                }
            };

            if project_id.map_or(true, |p| run.project_id == p) {
                runs.push(run);
            }
        }

        sort_by_recency(&mut runs);
        Ok(runs)
    }
}
