//! Versioned wire contract shared with the compute service
//!
//! This module provides:
//! - The typed request and response envelopes
//! - Structural validation with field-path error reporting

mod validate;

#[cfg(test)]
mod tests;

pub use validate::{
    validate, validate_request, validate_response, Direction, FieldError, Validated,
    ValidationError,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Contract version understood by this build
pub const API_VERSION: &str = "v1";

/// Default timezone applied when a request omits one
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Default resampling interval in minutes
pub const DEFAULT_TARGET_INTERVAL_MINUTES: u32 = 15;

/// Allowed resampling interval range in minutes
pub const TARGET_INTERVAL_RANGE: std::ops::RangeInclusive<u32> = 1..=60;

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_target_interval() -> u32 {
    DEFAULT_TARGET_INTERVAL_MINUTES
}

/// Contract version tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiVersion {
    #[serde(rename = "v1")]
    V1,
}

/// Kind of controlled equipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemType {
    Ahu,
    Rtu,
    VavGroup,
    ChillerPlant,
    BoilerPlant,
}

impl SystemType {
    pub const NAMES: &'static [&'static str] =
        &["AHU", "RTU", "VAV_GROUP", "CHILLER_PLANT", "BOILER_PLANT"];
}

/// Economizer arrangement on an air-side system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EconomizerType {
    None,
    DryBulb,
    Enthalpy,
    DifferentialDryBulb,
    DifferentialEnthalpy,
}

impl EconomizerType {
    pub const NAMES: &'static [&'static str] = &[
        "none",
        "dry_bulb",
        "enthalpy",
        "differential_dry_bulb",
        "differential_enthalpy",
    ];
}

/// One controlled piece of equipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentSystem {
    pub id: String,
    #[serde(rename = "type")]
    pub system_type: SystemType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tonnage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_motor_kw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vav_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economizer_type: Option<EconomizerType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_oa_cfm: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub critical_zone_ids: Vec<String>,
}

/// Canonical measurement tags a raw column can be mapped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CanonicalTag {
    #[serde(rename = "OAT")]
    OutsideAirTemp,
    #[serde(rename = "RAT")]
    ReturnAirTemp,
    #[serde(rename = "MAT")]
    MixedAirTemp,
    #[serde(rename = "SAT")]
    SupplyAirTemp,
    #[serde(rename = "SAT_SP")]
    SupplyAirTempSetpoint,
    #[serde(rename = "DSP")]
    DuctStaticPressure,
    #[serde(rename = "DSP_SP")]
    DuctStaticPressureSetpoint,
    #[serde(rename = "FAN_SPEED_PCT")]
    FanSpeedPct,
    #[serde(rename = "OA_DAMPER_PCT")]
    OutsideAirDamperPct,
    #[serde(rename = "CHWST")]
    ChilledWaterSupplyTemp,
    #[serde(rename = "CHWRT")]
    ChilledWaterReturnTemp,
    #[serde(rename = "HWST")]
    HotWaterSupplyTemp,
    #[serde(rename = "HWRT")]
    HotWaterReturnTemp,
    #[serde(rename = "SPACE_TEMP")]
    SpaceTemp,
    #[serde(rename = "ZONE_CO2")]
    ZoneCo2,
    #[serde(rename = "KW")]
    ElectricDemandKw,
    #[serde(rename = "ENABLE")]
    Enable,
    #[serde(rename = "OCC")]
    Occupancy,
}

impl CanonicalTag {
    pub const NAMES: &'static [&'static str] = &[
        "OAT",
        "RAT",
        "MAT",
        "SAT",
        "SAT_SP",
        "DSP",
        "DSP_SP",
        "FAN_SPEED_PCT",
        "OA_DAMPER_PCT",
        "CHWST",
        "CHWRT",
        "HWST",
        "HWRT",
        "SPACE_TEMP",
        "ZONE_CO2",
        "KW",
        "ENABLE",
        "OCC",
    ];
}

/// Translation table from raw time-series columns to canonical tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointMapping {
    pub timestamp_column: String,
    pub points: BTreeMap<CanonicalTag, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<BTreeMap<CanonicalTag, String>>,
}

/// Encoding of the raw trend payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendFormat {
    Csv,
}

impl TrendFormat {
    pub const NAMES: &'static [&'static str] = &["csv"];
}

/// Raw time-series payload sent to the compute service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPayload {
    pub format: TrendFormat,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveMode {
    Energy,
    Demand,
    Cost,
}

impl ObjectiveMode {
    pub const NAMES: &'static [&'static str] = &["energy", "demand", "cost"];
}

/// What the optimization should minimize
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    pub mode: ObjectiveMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demand_cap_kw: Option<f64>,
}

/// Occupied comfort band as an ordered `[low, high]` pair in °F
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComfortConstraints {
    pub band_f: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_co2_ppm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VentilationConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_oa_cfm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_oa_damper_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_fan_speed_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fan_speed_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_starts_per_hour: Option<u32>,
}

/// Operating limits the recommendations must respect
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comfort: Option<ComfortConstraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ventilation: Option<VentilationConstraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment: Option<EquipmentLimits>,
}

/// Analysis request envelope sent to the compute service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub api_version: ApiVersion,
    pub project_id: String,
    pub run_id: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub systems: Vec<EquipmentSystem>,
    pub point_mapping: PointMapping,
    pub trend: TrendPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<Objective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
    #[serde(default = "default_target_interval")]
    pub target_interval_minutes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

impl IssueSeverity {
    pub const NAMES: &'static [&'static str] = &["info", "warning", "error"];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQaIssue {
    pub code: String,
    pub severity: IssueSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<CanonicalTag>,
}

/// Data quality assessment of the submitted trend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQa {
    pub completeness_score: f64,
    #[serde(default)]
    pub issues: Vec<DataQaIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultSeverity {
    Low,
    Medium,
    High,
}

impl FaultSeverity {
    pub const NAMES: &'static [&'static str] = &["low", "medium", "high"];
}

/// Metrics and timestamps backing a finding or recommendation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub timestamps: Vec<String>,
}

/// A detected equipment or data anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultFinding {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_id: Option<String>,
    pub fault_type: String,
    pub severity: FaultSeverity,
    pub blocks_optimization: bool,
    #[serde(default)]
    pub evidence: Evidence,
    #[serde(default)]
    pub investigation_steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationCategory {
    Schedule,
    Reset,
    Economizer,
    Fdd,
    Other,
}

impl RecommendationCategory {
    pub const NAMES: &'static [&'static str] = &["schedule", "reset", "economizer", "fdd", "other"];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub const NAMES: &'static [&'static str] = &["low", "medium", "high"];
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatedImpact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demand_kw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_kwh: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

/// Technician-facing change to a single control point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_id: Option<String>,
    pub point: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
    pub proposed_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A suggested operational change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: String,
    pub title: String,
    pub category: RecommendationCategory,
    pub priority: Priority,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_impact: Option<EstimatedImpact>,
    #[serde(default)]
    pub point_changes: Vec<PointChange>,
    #[serde(default)]
    pub evidence: Evidence,
    #[serde(default)]
    pub rationale: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub findings_count: u32,
    pub blocking_findings_count: u32,
    pub recommendations_count: u32,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Analysis response envelope returned by the compute service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub api_version: ApiVersion,
    pub project_id: String,
    pub run_id: String,
    pub generated_at: String,
    pub data_qa: DataQa,
    pub fdd_findings: Vec<FaultFinding>,
    pub recommendations: Vec<Recommendation>,
    pub summary: Summary,
}

impl AnalysisResponse {
    /// True if any finding invalidates the recommendations produced alongside it
    pub fn has_blocking_findings(&self) -> bool {
        self.fdd_findings.iter().any(|f| f.blocks_optimization)
    }
}
