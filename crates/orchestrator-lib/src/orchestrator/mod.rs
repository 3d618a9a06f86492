//! Run orchestration
//!
//! `Orchestrator` is the entry point callers use to start, fetch and list
//! analysis runs. Starting a run fingerprints the request, reuses a matching
//! completed run when allowed, and otherwise records a queued run and hands
//! an [`AnalysisJob`] to the run queue.

mod job;


pub use job::AnalysisJob;

use crate::compute::AnalysisEngine;
use crate::contract::{
    self, AnalysisRequest, ApiVersion, Constraints, EquipmentSystem, FieldError, Objective,
    PointMapping, TrendPayload, ValidationError, API_VERSION, DEFAULT_TARGET_INTERVAL_MINUTES,
    DEFAULT_TIMEZONE,
};
use crate::error::OrchestratorError;
use crate::hashing;
use crate::health::HealthRegistry;
use crate::models::{AnalysisRun, RunPatch, RunStatus, TrendRef};
use crate::observability::{OrchestratorMetrics, StructuredLogger};
use crate::queue::RunQueue;
use crate::store::RunStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Placeholder run id used while validating a submission body
const PENDING_RUN_ID: &str = "pending";

fn default_trend_ref() -> TrendRef {
    TrendRef::InlineCsv
}

fn default_use_cache() -> bool {
    true
}

/// Inputs to [`Orchestrator::start_run`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunParams {
    pub project_id: String,
    pub systems: Vec<EquipmentSystem>,
    pub point_mapping: PointMapping,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<Objective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_interval_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Raw trend data; sent to the compute service but never persisted
    pub trend: TrendPayload,
    /// Where the trend data can be found again later
    #[serde(default = "default_trend_ref")]
    pub trend_ref: TrendRef,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

impl StartRunParams {
    /// Parse a submission body, reporting every problem with its field path
    ///
    /// The body is checked as a request envelope, so paths match the ones
    /// the compute contract uses.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let Value::Object(fields) = body else {
            return Err(ValidationError {
                direction: "request",
                errors: vec![FieldError {
                    path: "$".to_string(),
                    message: "must be an object".to_string(),
                }],
            });
        };

        let mut errors = Vec::new();
        let mut envelope = fields.clone();

        let trend_ref = match envelope.remove("trendRef") {
            None | Some(Value::Null) => default_trend_ref(),
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                errors.push(FieldError {
                    path: "trendRef".to_string(),
                    message: e.to_string(),
                });
                default_trend_ref()
            }),
        };

        let use_cache = match envelope.remove("useCache") {
            None | Some(Value::Null) => default_use_cache(),
            Some(Value::Bool(flag)) => flag,
            Some(_) => {
                errors.push(FieldError {
                    path: "useCache".to_string(),
                    message: "must be a boolean".to_string(),
                });
                default_use_cache()
            }
        };

        // Both are assigned by the orchestrator, whatever the caller sent
        envelope.insert("apiVersion".to_string(), Value::from(API_VERSION));
        envelope.insert("runId".to_string(), Value::from(PENDING_RUN_ID));

        match contract::validate_request(&Value::Object(envelope)) {
            Ok(request) if errors.is_empty() => Ok(Self {
                project_id: request.project_id,
                systems: request.systems,
                point_mapping: request.point_mapping,
                objective: request.objective,
                constraints: request.constraints,
                target_interval_minutes: Some(request.target_interval_minutes),
                timezone: Some(request.timezone),
                trend: request.trend,
                trend_ref,
                use_cache,
            }),
            Ok(_) => Err(ValidationError {
                direction: "request",
                errors,
            }),
            Err(e) => {
                errors.extend(e.errors);
                Err(ValidationError {
                    direction: "request",
                    errors,
                })
            }
        }
    }

    /// Build the compute request envelope for a new attempt
    fn to_request(&self, run_id: String) -> AnalysisRequest {
        AnalysisRequest {
            api_version: ApiVersion::V1,
            project_id: self.project_id.clone(),
            run_id,
            timezone: self
                .timezone
                .clone()
                .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
            systems: self.systems.clone(),
            point_mapping: self.point_mapping.clone(),
            trend: self.trend.clone(),
            objective: self.objective.clone(),
            constraints: self.constraints.clone(),
            target_interval_minutes: self
                .target_interval_minutes
                .unwrap_or(DEFAULT_TARGET_INTERVAL_MINUTES),
        }
    }
}

/// Result of [`Orchestrator::start_run`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    /// True when an earlier completed run was returned instead of new work
    pub cached: bool,
}

/// State shared between the orchestrator handle and its queued jobs
pub(crate) struct Shared {
    pub(crate) store: Arc<dyn RunStore>,
    pub(crate) engine: Arc<dyn AnalysisEngine>,
    pub(crate) queue: RunQueue,
    pub(crate) health: HealthRegistry,
    pub(crate) metrics: OrchestratorMetrics,
    pub(crate) logger: StructuredLogger,
}

/// Builder for [`Orchestrator`]
#[derive(Default)]
pub struct OrchestratorBuilder {
    store: Option<Arc<dyn RunStore>>,
    engine: Option<Arc<dyn AnalysisEngine>>,
    queue: Option<RunQueue>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl OrchestratorBuilder {
    pub fn store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn AnalysisEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn queue(mut self, queue: RunQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> anyhow::Result<Orchestrator> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Orchestrator requires a run store"))?;
        let engine = self
            .engine
            .ok_or_else(|| anyhow::anyhow!("Orchestrator requires an analysis engine"))?;
        let queue = self
            .queue
            .ok_or_else(|| anyhow::anyhow!("Orchestrator requires a run queue"))?;

        Ok(Orchestrator {
            shared: Arc::new(Shared {
                store,
                engine,
                queue,
                health: self.health.unwrap_or_default(),
                metrics: OrchestratorMetrics::new(),
                logger: self
                    .logger
                    .unwrap_or_else(|| StructuredLogger::new("run-orchestrator")),
            }),
        })
    }
}

/// Facade over the run store, queue and compute engine
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Start a run, or return a matching completed one
    ///
    /// Only contract violations and store failures are returned as errors.
    /// Compute failures happen later and are recorded on the run.
    pub async fn start_run(
        &self,
        owner_id: &str,
        params: StartRunParams,
    ) -> Result<StartRunOutcome, OrchestratorError> {
        let draft = params.to_request(Uuid::new_v4().to_string());
        let request = contract::validate_request(&serde_json::to_value(&draft)?)?;
        let hash = hashing::fingerprint(&request);

        if params.use_cache {
            if let Some(hit) = self.find_cached(owner_id, &request.project_id, &hash).await? {
                self.shared.metrics.inc_cache_hits();
                self.shared
                    .logger
                    .log_cache_hit(owner_id, &hit.project_id, &hit.id);
                return Ok(StartRunOutcome {
                    run_id: hit.id,
                    status: hit.status,
                    cached: true,
                });
            }
        }

        let run = AnalysisRun::queued(owner_id, &request, &hash, params.trend_ref);
        self.shared.store.create(&run).await?;

        let job = AnalysisJob::new(Arc::clone(&self.shared), owner_id, request);
        if !self.shared.queue.enqueue(run.id.clone(), Arc::new(job)) {
            let patch = RunPatch::status(RunStatus::Failed)
                .with_error(OrchestratorError::QueueClosed.to_string());
            if let Err(e) = self.shared.store.update(owner_id, &run.id, patch).await {
                error!(run_id = %run.id, error = %e, "Failed to record rejected run");
            }
            return Err(OrchestratorError::QueueClosed);
        }

        self.shared.metrics.inc_runs_started();
        self.shared
            .metrics
            .set_queue_pending(self.shared.queue.pending());
        self.shared
            .logger
            .log_run_started(owner_id, &run.project_id, &run.id, &hash);

        Ok(StartRunOutcome {
            run_id: run.id,
            status: RunStatus::Queued,
            cached: false,
        })
    }

    /// Fetch one run; a missing run is `Ok(None)`
    pub async fn get_run(
        &self,
        owner_id: &str,
        run_id: &str,
    ) -> Result<Option<AnalysisRun>, OrchestratorError> {
        match self.shared.store.get(owner_id, run_id).await {
            Ok(run) => Ok(Some(run)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// An owner's runs, most recently updated first
    pub async fn list_runs(
        &self,
        owner_id: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<AnalysisRun>, OrchestratorError> {
        Ok(self.shared.store.list(owner_id, project_id).await?)
    }

    /// Runs queued or executing in this process
    pub fn pending_runs(&self) -> usize {
        self.shared.queue.pending()
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.shared.health
    }

    /// Newest completed run of this owner and project with the same fingerprint
    async fn find_cached(
        &self,
        owner_id: &str,
        project_id: &str,
        hash: &str,
    ) -> Result<Option<AnalysisRun>, OrchestratorError> {
        let runs = match self.shared.store.list(owner_id, Some(project_id)).await {
            Ok(runs) => runs,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let hit = runs
            .into_iter()
            .find(|run| run.status == RunStatus::Completed && run.request_hash == hash);
        if hit.is_none() {
            debug!(owner_id = %owner_id, project_id = %project_id, "No cached run");
        }
        Ok(hit)
    }
}
