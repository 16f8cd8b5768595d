use std::cmp::Ordering;

use mnemo_core::{split_path_mode, JsonPathMode, Metadata, MetadataFilter, Value};

/// Evaluates a filter tree against in-memory metadata.
///
/// `JsonPath` leaves support member/index accessors (`$.a.b`, `$.a[0]`,
/// `$["a b"]`), an optional `lax`/`strict` prefix and one trailing comparison
/// (`? (@ == "x")`, with `==`, `!=`, `<`, `<=`, `>`, `>=`). In lax mode,
/// the default, arrays are unwrapped for comparisons as Postgres does.
/// The bare root `$` always exists. Anything unparseable evaluates to false.
pub fn matches(filter: &MetadataFilter, metadata: &Metadata) -> bool {
    match filter {
        MetadataFilter::JsonPath(path) => json_path_matches(path, metadata),
        MetadataFilter::Eq(key, value) => {
            lookup_key(metadata, key).is_some_and(|entry| values_equal(entry, value))
        }
        MetadataFilter::In(key, values) => lookup_key(metadata, key)
            .is_some_and(|entry| values.iter().any(|value| values_equal(entry, value))),
        MetadataFilter::Range { key, min, max } => {
            let Some(value) = lookup_key(metadata, key).and_then(Value::as_f64) else {
                return false;
            };
            if let Some(min_value) = min {
                let Some(min_value) = min_value.as_f64() else {
                    return false;
                };
                if value < min_value {
                    return false;
                }
            }
            if let Some(max_value) = max {
                let Some(max_value) = max_value.as_f64() else {
                    return false;
                };
                if value > max_value {
                    return false;
                }
            }
            true
        }
        MetadataFilter::All(filters) => filters.iter().all(|filter| matches(filter, metadata)),
        MetadataFilter::Any(filters) => filters.iter().any(|filter| matches(filter, metadata)),
    }
}

/// Resolves a dotted key (`a.b.c`) against metadata.
pub fn lookup_key<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let mut current = metadata.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

#[derive(Debug, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn json_path_matches(path: &str, metadata: &Metadata) -> bool {
    let (mode, body) = split_path_mode(path);
    let (accessor, predicate) = match body.split_once('?') {
        Some((accessor, predicate)) => (accessor, Some(predicate)),
        None => (path, None),
    };
    let Some(segments) = parse_segments(accessor.trim()) else {
        tracing::debug!(path, "unsupported json path in in-memory filter");
        return false;
    };
    let root;
    let value = if segments.is_empty() {
        root = Value::Object(
            metadata
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        );
        &root
    } else {
        match resolve(metadata, &segments) {
            Some(value) => value,
            None => return false,
        }
    };

    match predicate {
        None => true,
        Some(predicate) => match parse_predicate(predicate) {
            Some((op, literal)) => match (mode, value) {
                (JsonPathMode::Lax, Value::Array(items)) => {
                    items.iter().any(|item| compare(item, op, &literal))
                }
                (_, other) => compare(other, op, &literal),
            },
            None => {
                tracing::debug!(path, "unsupported json path predicate in in-memory filter");
                false
            }
        },
    }
}

fn parse_segments(accessor: &str) -> Option<Vec<Segment>> {
    let mut rest = accessor.strip_prefix('$')?;
    let mut segments = Vec::new();
    while !rest.is_empty() {
        if let Some(after_dot) = rest.strip_prefix('.') {
            let end = after_dot.find(&['.', '['][..]).unwrap_or(after_dot.len());
            let key = after_dot[..end].trim_matches('"');
            if key.is_empty() || key == "*" {
                return None;
            }
            segments.push(Segment::Key(key.to_string()));
            rest = &after_dot[end..];
        } else if let Some(after_bracket) = rest.strip_prefix('[') {
            let end = after_bracket.find(']')?;
            let inner = after_bracket[..end].trim();
            if let Some(quoted) = inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
                segments.push(Segment::Key(quoted.to_string()));
            } else {
                segments.push(Segment::Index(inner.parse().ok()?));
            }
            rest = &after_bracket[end + 1..];
        } else {
            return None;
        }
    }
    Some(segments)
}

fn resolve<'a>(metadata: &'a Metadata, segments: &[Segment]) -> Option<&'a Value> {
    let (first, tail) = segments.split_first()?;
    let Segment::Key(key) = first else {
        return None;
    };
    let mut current = metadata.get(key)?;
    for segment in tail {
        current = match segment {
            Segment::Key(key) => current.as_object()?.get(key)?,
            Segment::Index(index) => current.as_array()?.get(*index)?,
        };
    }
    Some(current)
}

fn parse_predicate(predicate: &str) -> Option<(Comparison, Value)> {
    let inner = predicate
        .trim()
        .strip_prefix('(')?
        .strip_suffix(')')?
        .trim()
        .strip_prefix('@')?
        .trim_start();

    const OPERATORS: [(&str, Comparison); 6] = [
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
    ];
    let (op, literal) = OPERATORS
        .iter()
        .find_map(|(token, op)| inner.strip_prefix(token).map(|rest| (*op, rest)))?;
    let literal = serde_json::from_str(literal.trim()).ok()?;
    Some((op, literal))
}

fn compare(value: &Value, op: Comparison, literal: &Value) -> bool {
    let ordering = match (value, literal) {
        (Value::Number(left), Value::Number(right)) => match (left.as_f64(), right.as_f64()) {
            (Some(left), Some(right)) => left.partial_cmp(&right),
            _ => None,
        },
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        (left, right) if left == right => Some(Ordering::Equal),
        _ => None,
    };

    match (op, ordering) {
        (Comparison::Eq, Some(Ordering::Equal)) => true,
        (Comparison::Eq, _) => false,
        (Comparison::Ne, Some(Ordering::Equal)) => false,
        (Comparison::Ne, _) => value != literal,
        (Comparison::Lt, Some(ordering)) => ordering == Ordering::Less,
        (Comparison::Le, Some(ordering)) => ordering != Ordering::Greater,
        (Comparison::Gt, Some(ordering)) => ordering == Ordering::Greater,
        (Comparison::Ge, Some(ordering)) => ordering != Ordering::Less,
        _ => false,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(left), Some(right)) => left == right,
        _ => left == right,
    }
}
