//! Stable serialization of call arguments.

use serde_json::Value;

use crate::cache::CacheKey;

/// Serialize `value` as JSON with object keys sorted at every depth.
///
/// Logically equal arguments always produce the same string regardless of
/// insertion order. `null` is treated as an empty argument object.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    match value {
        Value::Null => out.push_str("{}"),
        other => write_canonical(other, &mut out),
    }
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Cache key for `endpoint` called with `args`.
pub fn cache_key(endpoint: &str, args: &Value) -> CacheKey {
    CacheKey::new(endpoint, canonical_json(args))
}
