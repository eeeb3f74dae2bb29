//! Content normalization shared by the interpreter and tool-call handling.

use serde_json::Value;

/// Reduces a content value to one string.
///
/// Accepts a string, a list of parts (each normalized and concatenated in
/// order), or an object exposing a string `text` or `content`. Anything else
/// normalizes to the empty string.
pub fn normalize_content(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts.iter().map(normalize_content).collect(),
        Value::Object(fields) => {
            if let Some(Value::String(text)) = fields.get("text") {
                return text.clone();
            }
            if let Some(Value::String(text)) = fields.get("content") {
                return text.clone();
            }
            String::new()
        }
        _ => String::new(),
    }
}

/// Renders a tool payload (arguments or result) as text.
///
/// Strings pass through untouched; other values are pretty-printed JSON.
/// `null` has no rendering.
pub fn stringify_payload(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(
            serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        ),
    }
}

/// Pretty-prints accumulated tool arguments when they form valid JSON.
///
/// Argument deltas are concatenated as raw text, so the result is only valid
/// JSON once the call completes; partial text is returned unchanged.
pub fn pretty_payload(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string()),
        Err(_) => raw.to_string(),
    }
}

/// Coerces a scalar JSON value to a label (`"abc"`, `12`, `true`).
///
/// Objects, arrays and `null` have no label. Empty strings count as absent.
pub(crate) fn scalar_label(value: &Value) -> Option<String> {
    let label = match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };
    (!label.is_empty()).then_some(label)
}
