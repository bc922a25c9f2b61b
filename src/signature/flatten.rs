//! Key-path flattening shared by request signing and state merging
//!
//! Nested objects become `parent.child`, array elements become `parent[i]`,
//! and keys are visited in ASCII order at every nesting level.

use serde_json::{Map, Value};

/// Flatten a request payload into the `key=value&...` form the server signs.
///
/// Empty objects and arrays contribute nothing. A payload that is not an
/// object flattens to the empty string.
pub fn flatten_params(payload: &Value) -> String {
    let Value::Object(map) = payload else {
        return String::new();
    };
    let mut pairs = Vec::new();
    collect_object(map, "", &mut pairs);
    pairs.join("&")
}

/// Flatten an object into `(path, value)` leaves for merge-key addressing.
///
/// Unlike [`flatten_params`], empty containers are kept as leaves so that an
/// emptied list (for example a cleared error-code list) still replaces the
/// previous value.
pub fn flatten_fields(map: &Map<String, Value>, prefix: &str) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    for (key, value) in sorted_entries(map) {
        collect_field(&join_key(prefix, key), value, &mut out);
    }
    out
}

/// Render a scalar the way it appears in the signing base string.
pub fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn sorted_entries(map: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn collect_object(map: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in sorted_entries(map) {
        collect_pair(&join_key(prefix, key), value, out);
    }
}

fn collect_pair(path: &str, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => collect_object(map, path, out),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_pair(&format!("{}[{}]", path, i), item, out);
            }
        }
        scalar => out.push(format!("{}={}", path, render_scalar(scalar))),
    }
}

fn collect_field(path: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in sorted_entries(map) {
                collect_field(&join_key(path, key), child, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, item) in items.iter().enumerate() {
                collect_field(&format!("{}[{}]", path, i), item, out);
            }
        }
        leaf => out.push((path.to_string(), leaf.clone())),
    }
}
