//! Observability for the run orchestrator
//!
//! Provides:
//! - Prometheus metrics (run outcomes, cache hits, compute latency, queue depth)
//! - Structured JSON log events for the run lifecycle

use crate::models::RunStatus;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Compute calls range from sub-second to the full timeout
const COMPUTE_LATENCY_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
];

static GLOBAL_METRICS: OnceLock<OrchestratorMetricsInner> = OnceLock::new();

struct OrchestratorMetricsInner {
    runs_started: IntCounter,
    cache_hits: IntCounter,
    runs_finished: IntCounterVec,
    compute_errors: IntCounterVec,
    compute_latency_seconds: Histogram,
    queue_pending: IntGauge,
}

impl OrchestratorMetricsInner {
    fn new() -> Self {
        Self {
            runs_started: register_int_counter!(
                "run_orchestrator_runs_started_total",
                "Runs accepted and queued for analysis"
            )
            .expect("Failed to register runs_started"),

            cache_hits: register_int_counter!(
                "run_orchestrator_cache_hits_total",
                "Run requests answered by an earlier completed run"
            )
            .expect("Failed to register cache_hits"),

            runs_finished: register_int_counter_vec!(
                "run_orchestrator_runs_finished_total",
                "Runs that reached a terminal status",
                &["status"]
            )
            .expect("Failed to register runs_finished"),

            compute_errors: register_int_counter_vec!(
                "run_orchestrator_compute_errors_total",
                "Failed compute service calls by error kind",
                &["kind"]
            )
            .expect("Failed to register compute_errors"),

            compute_latency_seconds: register_histogram!(
                "run_orchestrator_compute_latency_seconds",
                "Wall time of compute service calls",
                COMPUTE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register compute_latency_seconds"),

            queue_pending: register_int_gauge!(
                "run_orchestrator_queue_pending",
                "Runs queued or executing"
            )
            .expect("Failed to register queue_pending"),
        }
    }
}

/// Handle to the process-wide metrics; clones share the same series
#[derive(Clone)]
pub struct OrchestratorMetrics {
    _private: (),
}

impl Default for OrchestratorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(OrchestratorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &OrchestratorMetricsInner {
        GLOBAL_METRICS.get_or_init(OrchestratorMetricsInner::new)
    }

    pub fn inc_runs_started(&self) {
        self.inner().runs_started.inc();
    }

    pub fn inc_cache_hits(&self) {
        self.inner().cache_hits.inc();
    }

    pub fn inc_runs_finished(&self, status: RunStatus) {
        self.inner()
            .runs_finished
            .with_label_values(&[status.as_str()])
            .inc();
    }

    pub fn inc_compute_errors(&self, kind: &str) {
        self.inner().compute_errors.with_label_values(&[kind]).inc();
    }

    pub fn observe_compute_latency(&self, duration_secs: f64) {
        self.inner().compute_latency_seconds.observe(duration_secs);
    }

    pub fn set_queue_pending(&self, pending: usize) {
        self.inner().queue_pending.set(pending as i64);
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Structured logger for run lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_run_started(&self, owner_id: &str, project_id: &str, run_id: &str, hash: &str) {
        info!(
            event = "run_started",
            instance = %self.instance,
            owner_id = %owner_id,
            project_id = %project_id,
            run_id = %run_id,
            request_hash = %hash,
            "Analysis run queued"
        );
    }

    pub fn log_cache_hit(&self, owner_id: &str, project_id: &str, run_id: &str) {
        info!(
            event = "run_cache_hit",
            instance = %self.instance,
            owner_id = %owner_id,
            project_id = %project_id,
            run_id = %run_id,
            "Reusing completed run with identical inputs"
        );
    }

    pub fn log_run_finished(
        &self,
        owner_id: &str,
        run_id: &str,
        status: RunStatus,
        elapsed_secs: f64,
        error: Option<&str>,
    ) {
        match error {
            Some(error) => warn!(
                event = "run_finished",
                instance = %self.instance,
                owner_id = %owner_id,
                run_id = %run_id,
                status = %status,
                elapsed_secs = elapsed_secs,
                error = %error,
                "Analysis run failed"
            ),
            None => info!(
                event = "run_finished",
                instance = %self.instance,
                owner_id = %owner_id,
                run_id = %run_id,
                status = %status,
                elapsed_secs = elapsed_secs,
                "Analysis run finished"
            ),
        }
    }

    pub fn log_startup(&self, version: &str, store_backend: &str, compute_url: &str) {
        info!(
            event = "service_started",
            instance = %self.instance,
            version = %version,
            store_backend = %store_backend,
            compute_url = %compute_url,
            "Run orchestrator started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Run orchestrator shutting down"
        );
    }
}
