//! Core data models for analysis runs

use crate::contract::{
    AnalysisRequest, AnalysisResponse, ApiVersion, Constraints, EquipmentSystem, Objective,
    PointMapping,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Record kind tag for analysis runs in the structured record store
pub const RUN_RECORD_KIND: &str = "analysis_run";

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
    BlockedByFaults,
}

impl RunStatus {
    /// True once the run can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::BlockedByFaults
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::BlockedByFaults => "blocked_by_faults",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the raw trend data for a run lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TrendRef {
    /// Opaque key into the upload store
    UserFile { key: String },
    /// Trend was submitted inline with the request
    InlineCsv,
}

/// Analysis request as persisted on the run record, without the raw trend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRequest {
    pub api_version: ApiVersion,
    pub project_id: String,
    pub run_id: String,
    pub timezone: String,
    pub systems: Vec<EquipmentSystem>,
    pub point_mapping: PointMapping,
    pub trend: TrendRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<Objective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
    pub target_interval_minutes: u32,
}

impl StoredRequest {
    /// Strip the trend content from a request, keeping a reference to it
    pub fn from_request(request: &AnalysisRequest, reference: TrendRef) -> Self {
        Self {
            api_version: request.api_version,
            project_id: request.project_id.clone(),
            run_id: request.run_id.clone(),
            timezone: request.timezone.clone(),
            systems: request.systems.clone(),
            point_mapping: request.point_mapping.clone(),
            trend: reference,
            objective: request.objective.clone(),
            constraints: request.constraints.clone(),
            target_interval_minutes: request.target_interval_minutes,
        }
    }
}

/// The orchestrator's record of one execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRun {
    pub id: String,
    pub owner_id: String,
    pub project_id: String,
    pub status: RunStatus,
    pub request_hash: String,
    pub request: StoredRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRun {
    /// Create a freshly queued run
    pub fn queued(
        owner_id: impl Into<String>,
        request: &AnalysisRequest,
        request_hash: impl Into<String>,
        trend_ref: TrendRef,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: request.run_id.clone(),
            owner_id: owner_id.into(),
            project_id: request.project_id.clone(),
            status: RunStatus::Queued,
            request_hash: request_hash.into(),
            request: StoredRequest::from_request(request, trend_ref),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Non-terminal run that has not moved for longer than `max_age`
    ///
    /// Queued and running jobs do not survive a restart, so callers use this
    /// to decide when to resubmit.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        !self.status.is_terminal() && now - self.updated_at > max_age
    }
}

/// Partial update applied to a stored run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunPatch {
    pub status: Option<RunStatus>,
    pub result: Option<AnalysisResponse>,
    pub error: Option<String>,
}

impl RunPatch {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_result(mut self, result: AnalysisResponse) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Merge into `run`; identity fields are never touched and `updated_at`
    /// always moves forward, even if the clock has not
    pub fn apply(self, run: &mut AnalysisRun, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            run.status = status;
        }
        if let Some(result) = self.result {
            run.result = Some(result);
        }
        if let Some(error) = self.error {
            run.error = Some(error);
        }
        let floor = run.updated_at + Duration::milliseconds(1);
        run.updated_at = if now > floor { now } else { floor };
    }
}
