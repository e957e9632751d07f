use std::time::Duration;

use serde_json::Value;

pub const DEFAULT_TTL: Duration = Duration::from_millis(300_000);

/// Key for a remote query cached by `(resource, filter)`.
pub fn query_key(resource: &str, filter: &Value) -> String {
    format!("query:{}:{}", resource, canonical_filter(filter))
}

/// Key for a single record lookup, equivalent to a query filtered on id.
pub fn record_key(resource: &str, id: &str) -> String {
    query_key(resource, &serde_json::json!({ "id": id }))
}

// Object keys sorted so logically equal filters share a cache entry.
fn canonical_filter(filter: &Value) -> String {
    match filter {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}={}", k, canonical_filter(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        other => other.to_string(),
    }
}
