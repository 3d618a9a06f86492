//! Errors surfaced to callers of the orchestrator
//!
//! Per-run failures never appear here; they are recorded on the run itself.

use crate::contract::ValidationError;
use crate::store::StoreError;
use thiserror::Error;

pub use crate::compute::ComputeError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The submitted request does not satisfy the contract; nothing was stored
    #[error(transparent)]
    RequestInvalid(#[from] ValidationError),

    #[error("run store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to encode request: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The queue worker has stopped, so the run can never execute
    #[error("run queue is not accepting work")]
    QueueClosed,
}

impl OrchestratorError {
    /// True for errors caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OrchestratorError::RequestInvalid(_)
                | OrchestratorError::Store(StoreError::InvalidKey(_))
        )
    }
}
