//! Request fingerprints for duplicate-work detection
//!
//! A fingerprint is SHA-256 over the canonical text of the request (object
//! keys sorted at every level, arrays kept in order) followed by a separate
//! SHA-256 of the raw trend content. The raw trend never appears in the
//! canonical text, so stored runs can drop it and still be matched.

use crate::contract::AnalysisRequest;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Nesting depth past which a subtree is replaced by a label
pub const MAX_CANONICAL_DEPTH: usize = 128;

/// Label emitted in place of a subtree nested deeper than [`MAX_CANONICAL_DEPTH`]
pub const DEPTH_LABEL: &str = "[MaxDepth]";

/// Request fields that never influence the compute result
const VOLATILE_FIELDS: &[&str] = &["runId"];

/// Render a JSON value in canonical text form
pub fn canonical_text(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, 0, &mut out);
    out
}

fn write_canonical(value: &Value, depth: usize, out: &mut String) {
    if depth > MAX_CANONICAL_DEPTH {
        write_string(DEPTH_LABEL, out);
        return;
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, depth + 1, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key], depth + 1, out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    // serde_json string escaping is deterministic
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => {
            let _ = write!(out, "\"{}\"", s.escape_default());
        }
    }
}

/// Hex SHA-256 of arbitrary bytes
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Fingerprint an arbitrary request-shaped value plus its trend content
pub fn fingerprint_value(request: &Value, trend_content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_text(request).as_bytes());
    hasher.update(b"\n");
    hasher.update(content_hash(trend_content).as_bytes());
    hex::encode(hasher.finalize())
}

/// Fingerprint an analysis request
///
/// `runId` is excluded because it is assigned per submission attempt, and the
/// trend content is hashed separately from the rest of the envelope.
pub fn fingerprint(request: &AnalysisRequest) -> String {
    let mut value = serde_json::to_value(request).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        for field in VOLATILE_FIELDS {
            map.remove(*field);
        }
        if let Some(Value::Object(trend)) = map.get_mut("trend") {
            trend.remove("content");
        }
    }
    fingerprint_value(&value, request.trend.content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::validate_request;
    use serde_json::json;

    fn request_value(run_id: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "projectId": "P1",
            "runId": run_id,
            "systems": [{ "id": "ahu-1", "type": "AHU", "name": "AHU-1" }],
            "pointMapping": { "timestampColumn": "ts", "points": { "OAT": "OAT_F" } },
            "trend": { "format": "csv", "content": "ts,OAT_F\n1,40\n" },
            "constraints": { "comfort": { "bandF": [68.0, 76.0] } }
        })
    }

    #[test]
    fn test_canonical_text_sorts_keys_at_every_level() {
        let a = json!({ "b": 1, "a": { "z": true, "y": null } });
        assert_eq!(canonical_text(&a), r#"{"a":{"y":null,"z":true},"b":1}"#);
    }

    #[test]
    fn test_canonical_text_keeps_array_order() {
        let a = json!([3, 1, 2]);
        assert_eq!(canonical_text(&a), "[3,1,2]");
        assert_ne!(canonical_text(&json!([1, 2])), canonical_text(&json!([2, 1])));
    }

    #[test]
    fn test_key_insertion_order_does_not_matter() {
        let a: Value =
            serde_json::from_str(r#"{"x":1,"y":{"p":"q","r":[1,{"m":1,"n":2}]}}"#).unwrap();
        let b: Value =
            serde_json::from_str(r#"{"y":{"r":[1,{"n":2,"m":1}],"p":"q"},"x":1}"#).unwrap();

        assert_eq!(fingerprint_value(&a, b"data"), fingerprint_value(&b, b"data"));
    }

    #[test]
    fn test_trend_content_changes_fingerprint() {
        let value = json!({ "projectId": "P1" });
        assert_ne!(fingerprint_value(&value, b"a,b\n1,2\n"), fingerprint_value(&value, b"a,b\n1,3\n"));
    }

    #[test]
    fn test_fingerprint_ignores_run_id() {
        let first = validate_request(&request_value("run-1")).unwrap();
        let second = validate_request(&request_value("run-2")).unwrap();

        assert_eq!(fingerprint(&first), fingerprint(&second));
    }

    #[test]
    fn test_fingerprint_is_stable_across_reparse() {
        let request = validate_request(&request_value("run-1")).unwrap();
        let text = serde_json::to_string(&request).unwrap();
        let reparsed: AnalysisRequest = serde_json::from_str(&text).unwrap();

        assert_eq!(fingerprint(&request), fingerprint(&reparsed));
    }

    #[test]
    fn test_constraint_change_changes_fingerprint() {
        let base = validate_request(&request_value("run-1")).unwrap();
        let mut value = request_value("run-1");
        value["constraints"]["comfort"]["bandF"] = json!([69.0, 76.0]);
        let changed = validate_request(&value).unwrap();

        assert_ne!(fingerprint(&base), fingerprint(&changed));
    }

    #[test]
    fn test_trend_change_changes_request_fingerprint() {
        let base = validate_request(&request_value("run-1")).unwrap();
        let mut changed = base.clone();
        changed.trend.content.push_str("2,41\n");

        assert_ne!(fingerprint(&base), fingerprint(&changed));
    }

    #[test]
    fn test_deep_nesting_is_labelled() {
        let mut value = json!(1);
        for _ in 0..(MAX_CANONICAL_DEPTH + 10) {
            value = json!([value]);
        }
        let text = canonical_text(&value);

        assert!(text.contains(DEPTH_LABEL));
    }

    #[test]
    fn test_content_hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
