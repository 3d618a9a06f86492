//! Queued execution of a single analysis run

use super::Shared;
use crate::compute::ComputeError;
use crate::contract::{AnalysisRequest, AnalysisResponse};
use crate::health::components;
use crate::models::{RunPatch, RunStatus};
use crate::queue::{JobContext, RunJob};
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Moves one run from `queued` to a terminal status
///
/// Holds the full request, trend content included, only for as long as the
/// job is queued.
pub struct AnalysisJob {
    shared: Arc<Shared>,
    owner_id: String,
    request: AnalysisRequest,
}

impl AnalysisJob {
    pub(crate) fn new(shared: Arc<Shared>, owner_id: &str, request: AnalysisRequest) -> Self {
        Self {
            shared,
            owner_id: owner_id.to_string(),
            request,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.request.run_id
    }

    async fn call_engine(&self, ctx: &JobContext) -> Result<AnalysisResponse, ComputeError> {
        let timeout = ctx.compute_timeout;
        let engine = Arc::clone(&self.shared.engine);
        let request = self.request.clone();
        // A panicking engine must still leave the run with a terminal status
        let mut call = tokio::spawn(async move { engine.analyze(&request, timeout).await });

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(ComputeError::Cancelled),
            // Enforced here as well as inside the engine
            result = tokio::time::timeout(timeout, &mut call) => match result {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(ComputeError::Aborted(e.to_string())),
                Err(_) => Err(ComputeError::Timeout(timeout)),
            },
        };
        call.abort();
        outcome
    }

    async fn record_compute_health(&self, error: Option<&ComputeError>) {
        match error {
            None => self.shared.health.set_healthy(components::COMPUTE).await,
            Some(ComputeError::Cancelled) | Some(ComputeError::RequestInvalid(_)) => {}
            Some(e) => {
                self.shared
                    .health
                    .set_degraded(components::COMPUTE, e.to_string())
                    .await
            }
        }
    }
}

#[async_trait]
impl RunJob for AnalysisJob {
    async fn execute(&self, ctx: &JobContext) -> anyhow::Result<()> {
        let started = Instant::now();
        let run_id = self.run_id();

        self.shared
            .store
            .update(&self.owner_id, run_id, RunPatch::status(RunStatus::Running))
            .await
            .with_context(|| format!("failed to mark run {} running", run_id))?;
        debug!(run_id = %run_id, "Run marked running");

        let outcome = self.call_engine(ctx).await;
        self.shared
            .metrics
            .observe_compute_latency(started.elapsed().as_secs_f64());

        let patch = match outcome {
            Ok(response) => {
                self.record_compute_health(None).await;
                let status = if response.has_blocking_findings() {
                    RunStatus::BlockedByFaults
                } else {
                    RunStatus::Completed
                };
                RunPatch::status(status).with_result(response)
            }
            Err(e) => {
                self.shared.metrics.inc_compute_errors(e.kind());
                self.record_compute_health(Some(&e)).await;
                RunPatch::status(RunStatus::Failed).with_error(e.to_string())
            }
        };

        let status = patch.status.unwrap_or(RunStatus::Failed);
        let error = patch.error.clone();

        let stored = self
            .shared
            .store
            .update(&self.owner_id, run_id, patch)
            .await;
        match &stored {
            Ok(_) => self.shared.health.set_healthy(components::STORE).await,
            Err(e) => {
                self.shared
                    .health
                    .set_degraded(components::STORE, e.to_string())
                    .await
            }
        }
        stored.with_context(|| format!("failed to record outcome of run {}", run_id))?;

        self.shared.metrics.inc_runs_finished(status);
        self.shared.logger.log_run_finished(
            &self.owner_id,
            run_id,
            status,
            started.elapsed().as_secs_f64(),
            error.as_deref(),
        );

        Ok(())
    }
}
