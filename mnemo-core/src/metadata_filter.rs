use serde::{Deserialize, Serialize};

use crate::value::json_kind;
use crate::{StoreError, Value};

/// Boolean expression over row metadata.
///
/// Leaves test a single key or JSON path; `All`/`Any` nest arbitrarily.
/// A leaf whose key or path is absent from the row evaluates to false.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum MetadataFilter {
    /// SQL/JSON path that must exist (or, with a filter expression, match) in the metadata.
    JsonPath(String),
    Eq(String, Value),
    In(String, Vec<Value>),
    Range {
        key: String,
        min: Option<Value>,
        max: Option<Value>,
    },
    All(Vec<MetadataFilter>),
    Any(Vec<MetadataFilter>),
}

/// How a JSON path treats structural mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonPathMode {
    /// Arrays are unwrapped and missing members are simply absent (the default).
    Lax,
    Strict,
}

/// Splits an optional leading `lax` / `strict` keyword off a JSON path.
pub fn split_path_mode(path: &str) -> (JsonPathMode, &str) {
    let path = path.trim();
    for (keyword, mode) in [("lax", JsonPathMode::Lax), ("strict", JsonPathMode::Strict)] {
        if let Some(rest) = path.strip_prefix(keyword) {
            if rest.starts_with(char::is_whitespace) {
                return (mode, rest.trim_start());
            }
        }
    }
    (JsonPathMode::Lax, path)
}

impl MetadataFilter {
    pub fn json_path(path: impl Into<String>) -> Self {
        MetadataFilter::JsonPath(path.into())
    }

    /// Parses the wire form used by HTTP callers:
    ///
    /// ```json
    /// {"where": {"jsonpath": "$.author ? (@ == \"alice\")"},
    ///  "and": [{"jsonpath": "$.tags"}],
    ///  "or":  [{"jsonpath": "$.a"}, {"jsonpath": "$.b"}]}
    /// ```
    ///
    /// Keys present on the same object are ANDed together.
    pub fn from_wire(value: &Value) -> Result<Self, StoreError> {
        let Value::Object(map) = value else {
            return Err(StoreError::invalid(format!(
                "metadata filter must be an object, got {}",
                json_kind(value)
            )));
        };

        let mut parts = Vec::new();
        for (key, nested) in map {
            match key.as_str() {
                "where" => parts.push(Self::from_wire(nested)?),
                "jsonpath" => {
                    let path = nested.as_str().ok_or_else(|| {
                        StoreError::invalid("metadata filter 'jsonpath' must be a string")
                    })?;
                    parts.push(MetadataFilter::JsonPath(path.to_string()));
                }
                "and" | "or" => {
                    let Value::Array(items) = nested else {
                        return Err(StoreError::invalid(format!(
                            "metadata filter '{key}' must be an array"
                        )));
                    };
                    let children = items
                        .iter()
                        .map(Self::from_wire)
                        .collect::<Result<Vec<_>, _>>()?;
                    if key == "and" {
                        parts.push(MetadataFilter::All(children));
                    } else {
                        parts.push(MetadataFilter::Any(children));
                    }
                }
                other => {
                    return Err(StoreError::invalid(format!(
                        "unknown metadata filter key '{other}'"
                    )))
                }
            }
        }

        let filter = match parts.len() {
            0 => return Err(StoreError::invalid("metadata filter must not be empty")),
            1 => parts.remove(0),
            _ => MetadataFilter::All(parts),
        };
        filter.validate()?;
        Ok(filter)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        match self {
            MetadataFilter::JsonPath(path) => {
                let (_, body) = split_path_mode(path);
                if !body.starts_with('$') {
                    return Err(StoreError::invalid(format!(
                        "json path must start with '$': {path}"
                    )));
                }
                Ok(())
            }
            MetadataFilter::Eq(key, _) | MetadataFilter::In(key, _) if key.trim().is_empty() => {
                Err(StoreError::invalid("metadata filter key must not be empty"))
            }
            MetadataFilter::In(key, values) if values.is_empty() => Err(StoreError::invalid(
                format!("in(...) on '{key}' requires at least one value"),
            )),
            MetadataFilter::Range { key, min, max } => {
                if key.trim().is_empty() {
                    return Err(StoreError::invalid("metadata filter key must not be empty"));
                }
                if min.is_none() && max.is_none() {
                    return Err(StoreError::invalid(format!(
                        "range on '{key}' requires at least one bound"
                    )));
                }
                Ok(())
            }
            MetadataFilter::All(children) | MetadataFilter::Any(children) => {
                if children.is_empty() {
                    return Err(StoreError::invalid("all/any groups must not be empty"));
                }
                children.iter().try_for_each(MetadataFilter::validate)
            }
            _ => Ok(()),
        }
    }
}
