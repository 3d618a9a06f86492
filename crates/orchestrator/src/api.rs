//! HTTP API for analysis runs, health checks and Prometheus metrics

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use orchestrator_lib::{
    contract::ValidationError,
    health::{ComponentStatus, HealthRegistry},
    observability::OrchestratorMetrics,
    Orchestrator, OrchestratorError, StartRunParams, StoreError,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub health_registry: HealthRegistry,
    pub metrics: OrchestratorMetrics,
}

impl AppState {
    pub fn new(
        orchestrator: Orchestrator,
        health_registry: HealthRegistry,
        metrics: OrchestratorMetrics,
    ) -> Self {
        Self {
            orchestrator,
            health_registry,
            metrics,
        }
    }
}

/// Error response for the run endpoints
pub enum ApiError {
    Invalid(ValidationError),
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::RequestInvalid(e) => ApiError::Invalid(e),
            OrchestratorError::Store(StoreError::InvalidKey(id)) => {
                ApiError::BadRequest(format!("invalid identifier '{}'", id))
            }
            closed @ OrchestratorError::QueueClosed => ApiError::Unavailable(closed.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Invalid(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": e.to_string(), "fields": e.errors })),
            )
                .into_response(),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Unavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": message })),
            )
                .into_response(),
            ApiError::Internal(message) => {
                error!(error = %message, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub project_id: Option<String>,
}

/// Start a run; 202 whether it was queued or answered from cache
async fn start_run(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let params = StartRunParams::from_json(&body).map_err(ApiError::Invalid)?;
    let outcome = state.orchestrator.start_run(&owner_id, params).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

async fn get_run(
    State(state): State<Arc<AppState>>,
    Path((owner_id, run_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    match state.orchestrator.get_run(&owner_id, &run_id).await? {
        Some(run) => Ok(Json(run).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("run {} not found", run_id) })),
        )
            .into_response()),
    }
}

async fn list_runs(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let runs = state
        .orchestrator
        .list_runs(&owner_id, query.project_id.as_deref())
        .await?;
    Ok(Json(runs))
}

/// 200 unless a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    state
        .metrics
        .set_queue_pending(state.orchestrator.pending_runs());

    match state.metrics.render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/owners/:owner_id/runs", get(list_runs).post(start_run))
        .route("/owners/:owner_id/runs/:run_id", get(get_run))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
