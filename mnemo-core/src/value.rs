use std::collections::HashMap;

pub type Value = serde_json::Value;

/// JSON-shaped metadata attached to sessions, messages, summaries and documents.
pub type Metadata = HashMap<String, Value>;

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
