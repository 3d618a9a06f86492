//! Contract validation tests

use super::*;
use serde_json::{json, Value};

fn sample_request() -> Value {
    json!({
        "apiVersion": "v1",
        "projectId": "P1",
        "runId": "run-1",
        "systems": [
            { "id": "ahu-1", "type": "AHU", "name": "AHU-1", "economizerType": "dry_bulb" }
        ],
        "pointMapping": {
            "timestampColumn": "Timestamp",
            "points": { "OAT": "OAT_F", "SAT": "SAT_F" },
            "units": { "OAT": "degF" }
        },
        "trend": { "format": "csv", "content": "Timestamp,OAT_F\n2024-01-01T00:00:00Z,41.0\n" },
        "objective": { "mode": "energy" },
        "constraints": {
            "comfort": { "bandF": [68.0, 76.0] },
            "equipment": { "minFanSpeedPct": 30.0, "maxFanSpeedPct": 100.0 }
        }
    })
}

fn sample_response() -> Value {
    json!({
        "apiVersion": "v1",
        "projectId": "P1",
        "runId": "run-1",
        "generatedAt": "2024-01-02T03:04:05Z",
        "dataQa": {
            "completenessScore": 0.92,
            "issues": [{ "code": "GAP", "severity": "warning", "message": "2h gap", "tag": "OAT" }]
        },
        "fddFindings": [{
            "id": "f-1",
            "systemId": "ahu-1",
            "faultType": "sat_sensor_drift",
            "severity": "medium",
            "blocksOptimization": false,
            "evidence": { "metrics": { "offsetF": 3.5 }, "timestamps": ["2024-01-01T06:00:00Z"] },
            "investigationSteps": ["Check SAT sensor calibration"]
        }],
        "recommendations": [{
            "id": "r-1",
            "title": "Reset supply air temperature",
            "category": "reset",
            "priority": "high",
            "confidence": 0.8,
            "estimatedImpact": { "energyKwh": 1200.0 },
            "pointChanges": [{ "point": "SAT_SP", "currentValue": "55", "proposedValue": "58" }],
            "rationale": ["Low cooling load in shoulder season"]
        }],
        "summary": {
            "findingsCount": 1,
            "blockingFindingsCount": 0,
            "recommendationsCount": 1,
            "notes": []
        }
    })
}

fn paths(err: &ValidationError) -> Vec<&str> {
    err.errors.iter().map(|e| e.path.as_str()).collect()
}

#[test]
fn test_valid_request_applies_defaults() {
    let request = validate_request(&sample_request()).unwrap();

    assert_eq!(request.api_version, ApiVersion::V1);
    assert_eq!(request.timezone, "UTC");
    assert_eq!(request.target_interval_minutes, 15);
    assert_eq!(request.systems[0].system_type, SystemType::Ahu);
    assert_eq!(
        request.point_mapping.points.get(&CanonicalTag::OutsideAirTemp).map(String::as_str),
        Some("OAT_F")
    );
}

#[test]
fn test_validate_dispatches_on_direction() {
    assert!(matches!(
        validate(&sample_request(), Direction::Request),
        Ok(Validated::Request(_))
    ));
    assert!(matches!(
        validate(&sample_response(), Direction::Response),
        Ok(Validated::Response(_))
    ));
    assert!(validate(&sample_request(), Direction::Response).is_err());
}

#[test]
fn test_missing_required_fields_are_all_reported() {
    let mut payload = sample_request();
    let obj = payload.as_object_mut().unwrap();
    obj.remove("projectId");
    obj.remove("pointMapping");

    let err = validate_request(&payload).unwrap_err();

    assert_eq!(err.direction, "request");
    assert!(paths(&err).contains(&"projectId"));
    assert!(paths(&err).contains(&"pointMapping"));
}

#[test]
fn test_empty_systems_rejected() {
    let mut payload = sample_request();
    payload["systems"] = json!([]);

    let err = validate_request(&payload).unwrap_err();
    assert_eq!(paths(&err), vec!["systems"]);
}

#[test]
fn test_unknown_system_type_rejected_with_index_path() {
    let mut payload = sample_request();
    payload["systems"][0]["type"] = json!("HEAT_PUMP");

    let err = validate_request(&payload).unwrap_err();
    assert_eq!(paths(&err), vec!["systems[0].type"]);
    assert!(err.errors[0].message.contains("HEAT_PUMP"));
}

#[test]
fn test_unknown_canonical_tag_rejected() {
    let mut payload = sample_request();
    payload["pointMapping"]["points"]["OUTSIDE_TEMP"] = json!("OAT_F");

    let err = validate_request(&payload).unwrap_err();
    assert_eq!(paths(&err), vec!["pointMapping.points.OUTSIDE_TEMP"]);
}

#[test]
fn test_empty_column_name_rejected() {
    let mut payload = sample_request();
    payload["pointMapping"]["points"]["SAT"] = json!("");

    let err = validate_request(&payload).unwrap_err();
    assert_eq!(paths(&err), vec!["pointMapping.points.SAT"]);
}

#[test]
fn test_empty_point_map_is_allowed() {
    let mut payload = sample_request();
    payload["pointMapping"]["points"] = json!({});
    payload["pointMapping"].as_object_mut().unwrap().remove("units");

    assert!(validate_request(&payload).is_ok());
}

#[test]
fn test_unordered_comfort_band_rejected() {
    let mut payload = sample_request();
    payload["constraints"]["comfort"]["bandF"] = json!([76.0, 68.0]);

    let err = validate_request(&payload).unwrap_err();
    assert_eq!(paths(&err), vec!["constraints.comfort.bandF"]);
}

#[test]
fn test_fan_speed_limits_must_be_ordered() {
    let mut payload = sample_request();
    payload["constraints"]["equipment"] = json!({ "minFanSpeedPct": 80.0, "maxFanSpeedPct": 40.0 });

    let err = validate_request(&payload).unwrap_err();
    assert_eq!(paths(&err), vec!["constraints.equipment.minFanSpeedPct"]);
}

#[test]
fn test_target_interval_out_of_range() {
    let mut payload = sample_request();
    payload["targetIntervalMinutes"] = json!(90);
    let err = validate_request(&payload).unwrap_err();
    assert_eq!(paths(&err), vec!["targetIntervalMinutes"]);

    payload["targetIntervalMinutes"] = json!(0);
    assert!(validate_request(&payload).is_err());

    payload["targetIntervalMinutes"] = json!(60);
    assert_eq!(validate_request(&payload).unwrap().target_interval_minutes, 60);
}

#[test]
fn test_null_optional_request_fields_use_defaults() {
    let mut payload = sample_request();
    payload["timezone"] = Value::Null;
    payload["targetIntervalMinutes"] = Value::Null;
    payload["objective"] = Value::Null;
    payload["systems"][0]["criticalZoneIds"] = Value::Null;
    payload["systems"][0]["tonnage"] = Value::Null;

    let request = validate_request(&payload).unwrap();
    assert_eq!(request.timezone, "UTC");
    assert_eq!(request.target_interval_minutes, 15);
    assert!(request.objective.is_none());
    assert!(request.systems[0].critical_zone_ids.is_empty());
}

#[test]
fn test_null_required_field_reported_at_its_path() {
    let mut payload = sample_request();
    payload["systems"][0]["name"] = Value::Null;

    let err = validate_request(&payload).unwrap_err();
    assert_eq!(paths(&err), vec!["systems[0].name"]);
}

#[test]
fn test_timezone_must_be_iana_name() {
    let mut payload = sample_request();
    payload["timezone"] = json!("America/Chicago");
    assert_eq!(validate_request(&payload).unwrap().timezone, "America/Chicago");

    payload["timezone"] = json!("Central Time");
    let err = validate_request(&payload).unwrap_err();
    assert_eq!(paths(&err), vec!["timezone"]);
    assert!(err.errors[0].message.contains("IANA"));

    payload["timezone"] = json!("");
    assert_eq!(paths(&validate_request(&payload).unwrap_err()), vec!["timezone"]);
}

#[test]
fn test_objective_mode_enumeration() {
    let mut payload = sample_request();
    payload["objective"] = json!({ "mode": "comfort" });

    let err = validate_request(&payload).unwrap_err();
    assert_eq!(paths(&err), vec!["objective.mode"]);
}

#[test]
fn test_non_object_payload_rejected() {
    let err = validate_request(&json!([1, 2, 3])).unwrap_err();
    assert_eq!(paths(&err), vec!["$"]);
}

#[test]
fn test_valid_response() {
    let response = validate_response(&sample_response()).unwrap();

    assert_eq!(response.fdd_findings.len(), 1);
    assert!(!response.has_blocking_findings());
    assert_eq!(response.recommendations[0].category, RecommendationCategory::Reset);
    assert_eq!(response.data_qa.issues[0].severity, IssueSeverity::Warning);
}

#[test]
fn test_null_optional_response_fields_use_defaults() {
    let mut payload = sample_response();
    payload["dataQa"]["issues"] = Value::Null;
    payload["fddFindings"][0]["evidence"] = Value::Null;
    payload["fddFindings"][0]["investigationSteps"] = Value::Null;
    payload["recommendations"][0]["pointChanges"] = Value::Null;
    payload["recommendations"][0]["rationale"] = Value::Null;
    payload["summary"]["notes"] = Value::Null;

    let response = validate_response(&payload).unwrap();
    assert!(response.data_qa.issues.is_empty());
    assert!(response.fdd_findings[0].investigation_steps.is_empty());
    assert!(response.recommendations[0].point_changes.is_empty());
    assert!(response.recommendations[0].rationale.is_empty());
    assert!(response.summary.notes.is_empty());
}

#[test]
fn test_null_inside_list_reported_at_its_index() {
    let mut payload = sample_response();
    payload["recommendations"][0]["rationale"] = json!(["fine", null]);

    let err = validate_response(&payload).unwrap_err();
    assert_eq!(paths(&err), vec!["recommendations[0].rationale[1]"]);
}

#[test]
fn test_response_completeness_out_of_range() {
    let mut payload = sample_response();
    payload["dataQa"]["completenessScore"] = json!(1.5);

    let err = validate_response(&payload).unwrap_err();
    assert_eq!(err.direction, "response");
    assert_eq!(paths(&err), vec!["dataQa.completenessScore"]);
}

#[test]
fn test_response_finding_requires_blocking_flag() {
    let mut payload = sample_response();
    payload["fddFindings"][0]
        .as_object_mut()
        .unwrap()
        .remove("blocksOptimization");
    payload["fddFindings"][0]["severity"] = json!("critical");

    let err = validate_response(&payload).unwrap_err();
    let found = paths(&err);
    assert!(found.contains(&"fddFindings[0].blocksOptimization"));
    assert!(found.contains(&"fddFindings[0].severity"));
}

#[test]
fn test_response_bad_timestamp_and_confidence() {
    let mut payload = sample_response();
    payload["generatedAt"] = json!("yesterday");
    payload["recommendations"][0]["confidence"] = json!(-0.1);

    let err = validate_response(&payload).unwrap_err();
    let found = paths(&err);
    assert!(found.contains(&"generatedAt"));
    assert!(found.contains(&"recommendations[0].confidence"));
}

#[test]
fn test_blocking_findings_detected() {
    let mut payload = sample_response();
    payload["fddFindings"][0]["blocksOptimization"] = json!(true);

    let response = validate_response(&payload).unwrap();
    assert!(response.has_blocking_findings());
}

#[test]
fn test_error_message_summarizes_first_violations() {
    let err = validate_request(&json!({})).unwrap_err();
    let message = err.to_string();

    assert!(message.starts_with("request failed validation"));
    assert!(message.contains("more"));
}

#[test]
fn test_enum_names_match_serde() {
    for name in SystemType::NAMES {
        assert!(serde_json::from_value::<SystemType>(json!(name)).is_ok(), "{}", name);
    }
    for name in CanonicalTag::NAMES {
        assert!(serde_json::from_value::<CanonicalTag>(json!(name)).is_ok(), "{}", name);
    }
    for name in EconomizerType::NAMES {
        assert!(serde_json::from_value::<EconomizerType>(json!(name)).is_ok(), "{}", name);
    }
    for name in RecommendationCategory::NAMES {
        assert!(serde_json::from_value::<RecommendationCategory>(json!(name)).is_ok());
    }
}
