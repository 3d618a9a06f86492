//! Service configuration

use anyhow::{Context, Result};
use orchestrator_lib::{HttpComputeConfig, StoreBackend};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// File name of the SQLite database inside the store path
pub const SQLITE_FILE_NAME: &str = "runs.db";

/// Which run store backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    File,
    Sqlite,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::File => "file",
            StoreKind::Sqlite => "sqlite",
        }
    }
}

/// Orchestrator configuration, read from `ORCHESTRATOR_*` variables
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Instance name used in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// HTTP port for the run API, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Base URL of the compute service
    #[serde(default = "default_compute_url")]
    pub compute_url: String,

    /// Deadline for one compute call in seconds
    #[serde(default = "default_compute_timeout")]
    pub compute_timeout_secs: u64,

    /// Optional bearer token for the compute service
    #[serde(default)]
    pub compute_api_token: Option<String>,

    #[serde(default = "default_store_backend")]
    pub store_backend: StoreKind,

    /// Directory holding run records
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "run-orchestrator".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_compute_url() -> String {
    "http://compute-service:8000".to_string()
}

fn default_compute_timeout() -> u64 {
    120
}

fn default_store_backend() -> StoreKind {
    StoreKind::File
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/var/lib/run-orchestrator")
}

impl OrchestratorConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_env(config::Environment::with_prefix("ORCHESTRATOR"))
    }

    fn from_env(env: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(env.try_parsing(true))
            .build()
            .context("failed to read configuration")?;

        let loaded: Self = config
            .try_deserialize()
            .context("invalid ORCHESTRATOR_* configuration")?;
        if loaded.compute_timeout_secs == 0 {
            anyhow::bail!("ORCHESTRATOR_COMPUTE_TIMEOUT_SECS must be positive");
        }
        Ok(loaded)
    }

    pub fn compute_timeout(&self) -> Duration {
        Duration::from_secs(self.compute_timeout_secs)
    }

    pub fn compute_config(&self) -> HttpComputeConfig {
        HttpComputeConfig {
            base_url: self.compute_url.clone(),
            api_token: self.compute_api_token.clone(),
            ..Default::default()
        }
    }

    /// Resolve the configured backend; SQLite keeps one file in the store path
    pub fn store_backend(&self) -> StoreBackend {
        match self.store_backend {
            StoreKind::File => StoreBackend::File {
                base_dir: self.store_path.clone(),
            },
            StoreKind::Sqlite => StoreBackend::Sqlite {
                path: self.store_path.join(SQLITE_FILE_NAME),
            },
        }
    }
}
