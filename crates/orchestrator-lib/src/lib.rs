//! Orchestration core for equipment analysis runs
//!
//! This crate provides:
//! - The versioned request/response contract and its validator
//! - Request fingerprints for reusing earlier results
//! - Durable run records on JSON files or SQLite
//! - A single-worker in-process run queue
//! - The compute service client
//! - Health checks and observability

pub mod compute;
pub mod contract;
pub mod error;
pub mod hashing;
pub mod health;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod queue;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use compute::{AnalysisEngine, ComputeError, HttpComputeClient, HttpComputeConfig};
pub use error::OrchestratorError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::{AnalysisRun, RunPatch, RunStatus, StoredRequest, TrendRef};
pub use observability::{OrchestratorMetrics, StructuredLogger};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, StartRunOutcome, StartRunParams};
pub use queue::{JobContext, QueueConfig, RunJob, RunQueue};
pub use store::{open_store, RunStore, StoreBackend, StoreError};
