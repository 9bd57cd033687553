//! Normalization of peer replies at the boundary.
//!
//! The peer returns collections either as JSON arrays or as maps keyed by a
//! 1-based index (`{"1": .., "2": ..}`). Callers only ever see `Vec`.

use serde_json::Value;

use super::ObjectRef;

/// Decode an object reference. `null` and anything that is not a reference
/// yield `None`.
pub fn object(value: &Value) -> Option<ObjectRef> {
    if value.is_null() {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

/// Flatten a list-or-indexed-map reply into an ordered `Vec`.
///
/// Maps with integer keys are ordered numerically; other keys keep insertion
/// order. `null` is an empty collection.
pub fn items(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(list) => list,
        Value::Object(map) => {
            if map.contains_key("$ref") {
                return vec![Value::Object(map)];
            }
            let mut entries: Vec<(Option<i64>, Value)> = map
                .into_iter()
                .map(|(k, v)| (k.parse::<i64>().ok(), v))
                .collect();
            if entries.iter().all(|(k, _)| k.is_some()) {
                entries.sort_by_key(|(k, _)| *k);
            }
            entries.into_iter().map(|(_, v)| v).collect()
        }
        other => vec![other],
    }
}

/// Like [`items`], keeping only entries that are object references.
pub fn objects(value: Value) -> Vec<ObjectRef> {
    items(value).iter().filter_map(object).collect()
}

/// The peer signals most mutations with a boolean; `null` counts as failure.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Array(a) => !a.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Integer reply, accepting floats and numeric strings.
#[allow(clippy::cast_possible_truncation)]
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
