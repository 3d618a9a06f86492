//! Structural validation of contract payloads
//!
//! Walks an untyped JSON payload, collects every violation with the path of
//! the offending field, and only then converts it into the typed envelope.
//! No physical plausibility checks happen here.

use super::{
    AnalysisRequest, AnalysisResponse, CanonicalTag, EconomizerType, FaultSeverity,
    IssueSeverity, ObjectiveMode, Priority, RecommendationCategory, SystemType, TrendFormat,
    API_VERSION, TARGET_INTERVAL_RANGE,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Which side of the compute boundary a payload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

/// Typed result of a successful validation
#[derive(Debug, Clone, PartialEq)]
pub enum Validated {
    Request(AnalysisRequest),
    Response(AnalysisResponse),
}

/// A single violation, located by a dotted field path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// All violations found in one payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{direction} failed validation: {}", summarize(.errors))]
pub struct ValidationError {
    pub direction: &'static str,
    pub errors: Vec<FieldError>,
}

fn summarize(errors: &[FieldError]) -> String {
    const SHOWN: usize = 3;
    let mut parts: Vec<String> = errors.iter().take(SHOWN).map(|e| e.to_string()).collect();
    if errors.len() > SHOWN {
        parts.push(format!("and {} more", errors.len() - SHOWN));
    }
    parts.join("; ")
}

/// Validate a payload for the given direction
pub fn validate(payload: &Value, direction: Direction) -> Result<Validated, ValidationError> {
    match direction {
        Direction::Request => validate_request(payload).map(Validated::Request),
        Direction::Response => validate_response(payload).map(Validated::Response),
    }
}

/// Validate an analysis request payload
pub fn validate_request(payload: &Value) -> Result<AnalysisRequest, ValidationError> {
    let mut checker = Checker::default();
    checker.request(payload);
    checker.finish("request", payload)
}

/// Validate an analysis response payload
pub fn validate_response(payload: &Value) -> Result<AnalysisResponse, ValidationError> {
    let mut checker = Checker::default();
    checker.response(payload);
    checker.finish("response", payload)
}

const NON_NEGATIVE: Option<(f64, f64)> = Some((0.0, f64::INFINITY));

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn index(path: &str, i: usize) -> String {
    format!("{}[{}]", path, i)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Drop null members so optional fields fall back to their defaults, the
/// same way the checks below treat them
fn without_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), without_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(without_nulls).collect()),
        other => other.clone(),
    }
}

#[derive(Default)]
struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn finish<T: serde::de::DeserializeOwned>(
        mut self,
        direction: &'static str,
        payload: &Value,
    ) -> Result<T, ValidationError> {
        if self.errors.is_empty() {
            match serde_json::from_value(without_nulls(payload)) {
                Ok(typed) => return Ok(typed),
                Err(e) => self.push("$", e.to_string()),
            }
        }
        Err(ValidationError {
            direction,
            errors: self.errors,
        })
    }

    fn object<'a>(&mut self, value: &'a Value, path: &str) -> Option<&'a Map<String, Value>> {
        match value {
            Value::Object(map) => Some(map),
            other => {
                let at = if path.is_empty() { "$" } else { path };
                self.push(at, format!("expected object, found {}", type_name(other)));
                None
            }
        }
    }

    /// Present and non-null, or records "is required"
    fn required<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Option<&'a Value> {
        match obj.get(key) {
            None | Some(Value::Null) => {
                self.push(join(path, key), "is required");
                None
            }
            Some(v) => Some(v),
        }
    }

    fn optional<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
        match obj.get(key) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v),
        }
    }

    fn non_empty_str<'a>(&mut self, value: &'a Value, path: &str) -> Option<&'a str> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s),
            Value::String(_) => {
                self.push(path, "must be a non-empty string");
                None
            }
            other => {
                self.push(path, format!("expected string, found {}", type_name(other)));
                None
            }
        }
    }

    fn string(&mut self, obj: &Map<String, Value>, key: &str, path: &str, required: bool) {
        let value = if required {
            self.required(obj, key, path)
        } else {
            Self::optional(obj, key)
        };
        if let Some(v) = value {
            self.non_empty_str(v, &join(path, key));
        }
    }

    fn one_of(
        &mut self,
        obj: &Map<String, Value>,
        key: &str,
        path: &str,
        allowed: &[&str],
        required: bool,
    ) {
        let value = if required {
            self.required(obj, key, path)
        } else {
            Self::optional(obj, key)
        };
        let Some(value) = value else { return };
        let at = join(path, key);
        match value.as_str() {
            Some(s) if allowed.contains(&s) => {}
            Some(s) => self.push(
                at,
                format!("'{}' is not one of: {}", s, allowed.join(", ")),
            ),
            None => self.push(at, format!("expected string, found {}", type_name(value))),
        }
    }

    fn number(
        &mut self,
        obj: &Map<String, Value>,
        key: &str,
        path: &str,
        range: Option<(f64, f64)>,
        required: bool,
    ) -> Option<f64> {
        let value = if required {
            self.required(obj, key, path)
        } else {
            Self::optional(obj, key)
        }?;
        let at = join(path, key);
        let Some(n) = value.as_f64() else {
            self.push(at, format!("expected number, found {}", type_name(value)));
            return None;
        };
        if let Some((lo, hi)) = range {
            if n < lo || n > hi {
                let message = if hi.is_infinite() {
                    format!("must be at least {}", lo)
                } else {
                    format!("must be between {} and {}", lo, hi)
                };
                self.push(at, message);
                return None;
            }
        }
        Some(n)
    }

    fn integer(
        &mut self,
        obj: &Map<String, Value>,
        key: &str,
        path: &str,
        range: Option<(u64, u64)>,
        required: bool,
    ) -> Option<u64> {
        let value = if required {
            self.required(obj, key, path)
        } else {
            Self::optional(obj, key)
        }?;
        let at = join(path, key);
        let Some(n) = value.as_u64() else {
            self.push(at, "must be a non-negative integer");
            return None;
        };
        if let Some((lo, hi)) = range {
            if n < lo || n > hi {
                self.push(at, format!("must be between {} and {}", lo, hi));
                return None;
            }
        }
        Some(n)
    }

    fn boolean(&mut self, obj: &Map<String, Value>, key: &str, path: &str) {
        if let Some(value) = self.required(obj, key, path) {
            if !value.is_boolean() {
                self.push(
                    join(path, key),
                    format!("expected boolean, found {}", type_name(value)),
                );
            }
        }
    }

    fn array<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &str,
        required: bool,
    ) -> Option<&'a Vec<Value>> {
        let value = if required {
            self.required(obj, key, path)
        } else {
            Self::optional(obj, key)
        }?;
        match value {
            Value::Array(items) => Some(items),
            other => {
                self.push(
                    join(path, key),
                    format!("expected array, found {}", type_name(other)),
                );
                None
            }
        }
    }

    fn string_list(&mut self, obj: &Map<String, Value>, key: &str, path: &str) {
        let at = join(path, key);
        if let Some(items) = self.array(obj, key, path, false) {
            for (i, item) in items.iter().enumerate() {
                self.non_empty_str(item, &index(&at, i));
            }
        }
    }

    fn api_version(&mut self, obj: &Map<String, Value>) {
        self.one_of(obj, "apiVersion", "", &[API_VERSION], true);
    }

    // ---- request ----

    fn request(&mut self, payload: &Value) {
        let Some(obj) = self.object(payload, "") else { return };

        self.api_version(obj);
        self.string(obj, "projectId", "", true);
        self.string(obj, "runId", "", true);
        self.timezone(obj);

        if let Some(systems) = self.array(obj, "systems", "", true) {
            if systems.is_empty() {
                self.push("systems", "must contain at least one system");
            }
            for (i, system) in systems.iter().enumerate() {
                self.system(system, &index("systems", i));
            }
        }

        if let Some(mapping) = self.required(obj, "pointMapping", "") {
            self.point_mapping(mapping, "pointMapping");
        }

        if let Some(trend) = self.required(obj, "trend", "") {
            if let Some(t) = self.object(trend, "trend") {
                self.one_of(t, "format", "trend", TrendFormat::NAMES, true);
                if let Some(content) = self.required(t, "content", "trend") {
                    if !content.is_string() {
                        self.push(
                            "trend.content",
                            format!("expected string, found {}", type_name(content)),
                        );
                    }
                }
            }
        }

        if let Some(objective) = Self::optional(obj, "objective") {
            if let Some(o) = self.object(objective, "objective") {
                self.one_of(o, "mode", "objective", ObjectiveMode::NAMES, true);
                self.number(o, "demandCapKw", "objective", NON_NEGATIVE, false);
            }
        }

        if let Some(constraints) = Self::optional(obj, "constraints") {
            self.constraints(constraints, "constraints");
        }

        let (lo, hi) = (
            *TARGET_INTERVAL_RANGE.start() as u64,
            *TARGET_INTERVAL_RANGE.end() as u64,
        );
        self.integer(obj, "targetIntervalMinutes", "", Some((lo, hi)), false);
    }

    fn timezone(&mut self, obj: &Map<String, Value>) {
        let Some(value) = Self::optional(obj, "timezone") else { return };
        let Some(name) = self.non_empty_str(value, "timezone") else { return };
        if name.parse::<chrono_tz::Tz>().is_err() {
            self.push("timezone", format!("'{}' is not an IANA timezone", name));
        }
    }

    fn system(&mut self, value: &Value, path: &str) {
        let Some(obj) = self.object(value, path) else { return };
        self.string(obj, "id", path, true);
        self.one_of(obj, "type", path, SystemType::NAMES, true);
        self.string(obj, "name", path, true);
        self.number(obj, "tonnage", path, NON_NEGATIVE, false);
        self.number(obj, "fanMotorKw", path, NON_NEGATIVE, false);
        self.integer(obj, "vavCount", path, None, false);
        self.one_of(obj, "economizerType", path, EconomizerType::NAMES, false);
        self.number(obj, "minOaCfm", path, NON_NEGATIVE, false);
        self.string_list(obj, "criticalZoneIds", path);
    }

    fn point_mapping(&mut self, value: &Value, path: &str) {
        let Some(obj) = self.object(value, path) else { return };
        self.string(obj, "timestampColumn", path, true);

        if let Some(points) = self.required(obj, "points", path) {
            let at = join(path, "points");
            if let Some(map) = self.object(points, &at) {
                for (tag, column) in map {
                    let tag_path = join(&at, tag);
                    self.canonical_tag(tag, &tag_path);
                    self.non_empty_str(column, &tag_path);
                }
            }
        }

        if let Some(units) = Self::optional(obj, "units") {
            let at = join(path, "units");
            if let Some(map) = self.object(units, &at) {
                for (tag, unit) in map {
                    let tag_path = join(&at, tag);
                    self.canonical_tag(tag, &tag_path);
                    self.non_empty_str(unit, &tag_path);
                }
            }
        }
    }

    fn canonical_tag(&mut self, tag: &str, path: &str) {
        if !CanonicalTag::NAMES.contains(&tag) {
            self.push(path, format!("'{}' is not a canonical tag", tag));
        }
    }

    fn constraints(&mut self, value: &Value, path: &str) {
        let Some(obj) = self.object(value, path) else { return };

        if let Some(comfort) = Self::optional(obj, "comfort") {
            let at = join(path, "comfort");
            if let Some(c) = self.object(comfort, &at) {
                if let Some(band) = self.array(c, "bandF", &at, true) {
                    self.ordered_pair(band, &join(&at, "bandF"));
                }
                self.number(c, "maxCo2Ppm", &at, NON_NEGATIVE, false);
            }
        }

        if let Some(ventilation) = Self::optional(obj, "ventilation") {
            let at = join(path, "ventilation");
            if let Some(v) = self.object(ventilation, &at) {
                self.number(v, "minOaCfm", &at, NON_NEGATIVE, false);
                self.number(v, "minOaDamperPct", &at, Some((0.0, 100.0)), false);
            }
        }

        if let Some(equipment) = Self::optional(obj, "equipment") {
            let at = join(path, "equipment");
            if let Some(e) = self.object(equipment, &at) {
                let min = self.number(e, "minFanSpeedPct", &at, Some((0.0, 100.0)), false);
                let max = self.number(e, "maxFanSpeedPct", &at, Some((0.0, 100.0)), false);
                if let (Some(min), Some(max)) = (min, max) {
                    if min > max {
                        self.push(
                            join(&at, "minFanSpeedPct"),
                            "must not exceed maxFanSpeedPct",
                        );
                    }
                }
                self.integer(e, "maxStartsPerHour", &at, None, false);
            }
        }
    }

    fn ordered_pair(&mut self, items: &[Value], path: &str) {
        if items.len() != 2 {
            self.push(path, "must be a [low, high] pair");
            return;
        }
        let low = items[0].as_f64();
        let high = items[1].as_f64();
        match (low, high) {
            (Some(low), Some(high)) if low < high => {}
            (Some(_), Some(_)) => self.push(path, "low bound must be less than high bound"),
            _ => self.push(path, "bounds must be numbers"),
        }
    }

    // ---- response ----

    fn response(&mut self, payload: &Value) {
        let Some(obj) = self.object(payload, "") else { return };

        self.api_version(obj);
        self.string(obj, "projectId", "", true);
        self.string(obj, "runId", "", true);

        if let Some(generated) = self.required(obj, "generatedAt", "") {
            match generated.as_str() {
                Some(s) if chrono::DateTime::parse_from_rfc3339(s).is_ok() => {}
                _ => self.push("generatedAt", "must be an RFC 3339 timestamp"),
            }
        }

        if let Some(qa) = self.required(obj, "dataQa", "") {
            if let Some(q) = self.object(qa, "dataQa") {
                self.number(q, "completenessScore", "dataQa", Some((0.0, 1.0)), true);
                if let Some(issues) = self.array(q, "issues", "dataQa", false) {
                    for (i, issue) in issues.iter().enumerate() {
                        let at = index("dataQa.issues", i);
                        if let Some(o) = self.object(issue, &at) {
                            self.string(o, "code", &at, true);
                            self.one_of(o, "severity", &at, IssueSeverity::NAMES, true);
                            self.string(o, "message", &at, true);
                            self.one_of(o, "tag", &at, CanonicalTag::NAMES, false);
                        }
                    }
                }
            }
        }

        if let Some(findings) = self.array(obj, "fddFindings", "", true) {
            for (i, finding) in findings.iter().enumerate() {
                self.finding(finding, &index("fddFindings", i));
            }
        }

        if let Some(recs) = self.array(obj, "recommendations", "", true) {
            for (i, rec) in recs.iter().enumerate() {
                self.recommendation(rec, &index("recommendations", i));
            }
        }

        if let Some(summary) = self.required(obj, "summary", "") {
            if let Some(s) = self.object(summary, "summary") {
                self.integer(s, "findingsCount", "summary", None, true);
                self.integer(s, "blockingFindingsCount", "summary", None, true);
                self.integer(s, "recommendationsCount", "summary", None, true);
                self.string_list(s, "notes", "summary");
            }
        }
    }

    fn evidence(&mut self, obj: &Map<String, Value>, path: &str) {
        let Some(evidence) = Self::optional(obj, "evidence") else { return };
        let at = join(path, "evidence");
        let Some(e) = self.object(evidence, &at) else { return };
        if let Some(metrics) = Self::optional(e, "metrics") {
            let metrics_at = join(&at, "metrics");
            if let Some(m) = self.object(metrics, &metrics_at) {
                for (name, value) in m {
                    if !value.is_number() {
                        self.push(join(&metrics_at, name), "expected number");
                    }
                }
            }
        }
        self.string_list(e, "timestamps", &at);
    }

    fn finding(&mut self, value: &Value, path: &str) {
        let Some(obj) = self.object(value, path) else { return };
        self.string(obj, "id", path, true);
        self.string(obj, "systemId", path, false);
        self.string(obj, "faultType", path, true);
        self.one_of(obj, "severity", path, FaultSeverity::NAMES, true);
        self.boolean(obj, "blocksOptimization", path);
        self.evidence(obj, path);
        self.string_list(obj, "investigationSteps", path);
    }

    fn recommendation(&mut self, value: &Value, path: &str) {
        let Some(obj) = self.object(value, path) else { return };
        self.string(obj, "id", path, true);
        self.string(obj, "title", path, true);
        self.one_of(obj, "category", path, RecommendationCategory::NAMES, true);
        self.one_of(obj, "priority", path, Priority::NAMES, true);
        self.number(obj, "confidence", path, Some((0.0, 1.0)), true);

        if let Some(impact) = Self::optional(obj, "estimatedImpact") {
            let at = join(path, "estimatedImpact");
            if let Some(i) = self.object(impact, &at) {
                self.number(i, "demandKw", &at, None, false);
                self.number(i, "energyKwh", &at, None, false);
                self.number(i, "costUsd", &at, None, false);
            }
        }

        if let Some(changes) = self.array(obj, "pointChanges", path, false) {
            let changes_at = join(path, "pointChanges");
            for (i, change) in changes.iter().enumerate() {
                let at = index(&changes_at, i);
                if let Some(c) = self.object(change, &at) {
                    self.string(c, "systemId", &at, false);
                    self.string(c, "point", &at, true);
                    self.string(c, "proposedValue", &at, true);
                }
            }
        }

        self.evidence(obj, path);
        self.string_list(obj, "rationale", path);
    }
}
