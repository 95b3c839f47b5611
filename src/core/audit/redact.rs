//! Redaction of sensitive fields.

use serde_json::Value;

use crate::core::constants::{REDACTED, SENSITIVE_TERMS};

/// True if a field name contains a sensitive term (case-insensitive).
pub fn is_sensitive(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_TERMS.iter().any(|term| key.contains(term))
}

/// Replace the value of every sensitive field with the redaction marker.
///
/// Walks nested objects and arrays. A sensitive key is redacted as a whole,
/// even when its value is itself an object.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive(k) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}
