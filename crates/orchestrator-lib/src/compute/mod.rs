//! Client side of the compute service
//!
//! This module provides:
//! - The `AnalysisEngine` trait the orchestrator calls
//! - An HTTP implementation validating both directions against the contract
//! - The error taxonomy for a single compute call

mod http;

pub use http::{HttpComputeClient, HttpComputeConfig};

use crate::contract::{AnalysisRequest, AnalysisResponse, ValidationError};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from one compute call
#[derive(Debug, Error)]
pub enum ComputeError {
    /// The outgoing request failed contract validation
    #[error("analysis request is invalid: {0}")]
    RequestInvalid(ValidationError),

    /// The call did not finish within its deadline
    #[error("compute service timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The process is shutting down
    #[error("analysis cancelled")]
    Cancelled,

    /// The service answered with a non-success status
    #[error("compute service returned {status}: {message}")]
    Http {
        status: u16,
        message: String,
        body: Option<serde_json::Value>,
    },

    /// The service could not be reached
    #[error("compute service unreachable: {0}")]
    Transport(String),

    /// The service answered with a body that does not match the contract
    #[error("compute service returned an invalid response: {0}")]
    ResponseInvalid(String),

    /// The engine task panicked or was torn down before answering
    #[error("compute call aborted: {0}")]
    Aborted(String),
}

impl ComputeError {
    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ComputeError::RequestInvalid(_) => "request_invalid",
            ComputeError::Timeout(_) => "timeout",
            ComputeError::Cancelled => "cancelled",
            ComputeError::Http { .. } => "http",
            ComputeError::Transport(_) => "transport",
            ComputeError::ResponseInvalid(_) => "response_invalid",
            ComputeError::Aborted(_) => "aborted",
        }
    }
}

/// The remote numerical service that turns a request into findings and
/// recommendations
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Run one analysis, giving up after `timeout`
    async fn analyze(
        &self,
        request: &AnalysisRequest,
        timeout: Duration,
    ) -> Result<AnalysisResponse, ComputeError>;
}

/// Check that a response answers the request it was issued for
pub(crate) fn check_identity(
    request: &AnalysisRequest,
    response: &AnalysisResponse,
) -> Result<(), ComputeError> {
    if response.run_id != request.run_id || response.project_id != request.project_id {
        return Err(ComputeError::ResponseInvalid(format!(
            "response is for {}/{}, expected {}/{}",
            response.project_id, response.run_id, request.project_id, request.run_id
        )));
    }
    Ok(())
}
