//! Shared fixtures for unit tests

use crate::contract::{
    AnalysisRequest, AnalysisResponse, ApiVersion, CanonicalTag, DataQa, EquipmentSystem,
    Evidence, FaultFinding, FaultSeverity, PointChange, PointMapping, Priority, Recommendation,
    RecommendationCategory, Summary, SystemType, TrendFormat, TrendPayload,
};
use crate::models::{AnalysisRun, TrendRef};
use std::collections::BTreeMap;

pub(crate) fn create_test_system() -> EquipmentSystem {
    EquipmentSystem {
        id: "ahu-1".to_string(),
        system_type: SystemType::Ahu,
        name: "AHU-1".to_string(),
        tonnage: None,
        fan_motor_kw: None,
        vav_count: None,
        economizer_type: None,
        min_oa_cfm: None,
        critical_zone_ids: vec![],
    }
}

pub(crate) fn create_test_mapping() -> PointMapping {
    let mut points = BTreeMap::new();
    points.insert(CanonicalTag::OutsideAirTemp, "OAT_F".to_string());
    PointMapping {
        timestamp_column: "Timestamp".to_string(),
        points,
        units: None,
    }
}

pub(crate) fn create_test_request(run_id: &str, project_id: &str) -> AnalysisRequest {
    AnalysisRequest {
        api_version: ApiVersion::V1,
        project_id: project_id.to_string(),
        run_id: run_id.to_string(),
        timezone: "UTC".to_string(),
        systems: vec![create_test_system()],
        point_mapping: create_test_mapping(),
        trend: TrendPayload {
            format: TrendFormat::Csv,
            content: "Timestamp,OAT_F\n2024-01-01T00:00:00Z,41.5\n".to_string(),
        },
        objective: None,
        constraints: None,
        target_interval_minutes: 15,
    }
}

pub(crate) fn create_test_run(owner_id: &str, run_id: &str, project_id: &str) -> AnalysisRun {
    let request = create_test_request(run_id, project_id);
    AnalysisRun::queued(
        owner_id,
        &request,
        format!("hash-{}", run_id),
        TrendRef::UserFile {
            key: format!("{}/{}.csv", owner_id, run_id),
        },
    )
}

/// Response with one finding and one recommendation
pub(crate) fn create_test_response(run_id: &str, project_id: &str, blocking: bool) -> AnalysisResponse {
    let mut metrics = BTreeMap::new();
    metrics.insert("offsetF".to_string(), 3.5);

    AnalysisResponse {
        api_version: ApiVersion::V1,
        project_id: project_id.to_string(),
        run_id: run_id.to_string(),
        generated_at: "2024-01-02T03:04:05Z".to_string(),
        data_qa: DataQa {
            completeness_score: 0.75,
            issues: vec![],
        },
        fdd_findings: vec![FaultFinding {
            id: "f-1".to_string(),
            system_id: Some("ahu-1".to_string()),
            fault_type: "oat_sensor_bias".to_string(),
            severity: FaultSeverity::Medium,
            blocks_optimization: blocking,
            evidence: Evidence {
                metrics,
                timestamps: vec!["2024-01-01T06:00:00Z".to_string()],
            },
            investigation_steps: vec!["Compare OAT against local weather".to_string()],
        }],
        recommendations: vec![Recommendation {
            id: "r-1".to_string(),
            title: "Widen economizer lockout".to_string(),
            category: RecommendationCategory::Economizer,
            priority: Priority::Medium,
            confidence: 0.5,
            estimated_impact: None,
            point_changes: vec![PointChange {
                system_id: Some("ahu-1".to_string()),
                point: "ECON_HL".to_string(),
                current_value: Some("65".to_string()),
                proposed_value: "70".to_string(),
                notes: None,
            }],
            evidence: Evidence::default(),
            rationale: vec!["Free cooling hours are underused".to_string()],
        }],
        summary: Summary {
            findings_count: 1,
            blocking_findings_count: u32::from(blocking),
            recommendations_count: 1,
            notes: vec![],
        },
    }
}

/// Submission for one AHU with only OAT mapped
pub(crate) fn create_test_params(project_id: &str) -> crate::orchestrator::StartRunParams {
    let request = create_test_request("unused", project_id);
    crate::orchestrator::StartRunParams {
        project_id: project_id.to_string(),
        systems: request.systems,
        point_mapping: request.point_mapping,
        objective: None,
        constraints: None,
        target_interval_minutes: None,
        timezone: None,
        trend: request.trend,
        trend_ref: TrendRef::UserFile {
            key: format!("uploads/{}/trend.csv", project_id),
        },
        use_cache: true,
    }
}
