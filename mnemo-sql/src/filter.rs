use chrono::{DateTime, Utc};
use mnemo_core::{MetadataFilter, Value};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

/// Appends `filter` as one parenthesised boolean predicate over the JSONB
/// `column`. Every key, path and value is bound, never spliced; `column` must
/// be a trusted identifier.
pub fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, column: &str, filter: &MetadataFilter) {
    match filter {
        MetadataFilter::JsonPath(path) => {
            builder.push("jsonb_path_exists(");
            builder.push(column);
            builder.push(", ");
            builder.push_bind(path.clone());
            builder.push("::jsonpath)");
        }
        MetadataFilter::Eq(key, value) => {
            builder.push("(");
            push_key_path(builder, column, key);
            builder.push(" = ");
            builder.push_bind(Json(value.clone()));
            builder.push("::jsonb)");
        }
        MetadataFilter::In(key, values) => {
            builder.push("(");
            push_key_path(builder, column, key);
            builder.push(" IN (");
            {
                let mut separated = builder.separated(", ");
                for value in values {
                    separated.push_bind(Json(value.clone()));
                    separated.push_unseparated("::jsonb");
                }
            }
            builder.push("))");
        }
        MetadataFilter::Range { key, min, max } => push_range(builder, column, key, min, max),
        MetadataFilter::All(children) => push_group(builder, column, children, " AND ", "TRUE"),
        MetadataFilter::Any(children) => push_group(builder, column, children, " OR ", "FALSE"),
    }
}

/// Inclusive `created_at` bounds, each prefixed with ` AND `.
pub fn push_date_range(
    builder: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) {
    if let Some(start) = start {
        builder.push(" AND ");
        builder.push(column);
        builder.push(" >= ");
        builder.push_bind(start);
    }
    if let Some(end) = end {
        builder.push(" AND ");
        builder.push(column);
        builder.push(" <= ");
        builder.push_bind(end);
    }
}

fn push_group(
    builder: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    children: &[MetadataFilter],
    joiner: &str,
    empty: &str,
) {
    if children.is_empty() {
        builder.push(empty);
        return;
    }
    builder.push("(");
    for (index, child) in children.iter().enumerate() {
        if index > 0 {
            builder.push(joiner);
        }
        push_filter(builder, column, child);
    }
    builder.push(")");
}

fn push_key_path(builder: &mut QueryBuilder<'_, Postgres>, column: &str, key: &str) {
    builder.push(column);
    builder.push(" #> ");
    builder.push_bind(key_path(key));
    builder.push("::text[]");
}

/// Numeric range; non-numeric stored values never match and never raise a cast error.
fn push_range(
    builder: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    key: &str,
    min: &Option<Value>,
    max: &Option<Value>,
) {
    let bounds = [(min, " >= "), (max, " <= ")];
    if bounds
        .iter()
        .any(|(bound, _)| matches!(bound, Some(value) if value.as_f64().is_none()))
    {
        builder.push("FALSE");
        return;
    }

    builder.push("(");
    let mut first = true;
    for (bound, op) in bounds {
        let Some(value) = bound.as_ref().and_then(Value::as_f64) else {
            continue;
        };
        if !first {
            builder.push(" AND ");
        }
        first = false;
        builder.push("(CASE WHEN jsonb_typeof(");
        push_key_path(builder, column, key);
        builder.push(") = 'number' THEN (");
        builder.push(column);
        builder.push(" #>> ");
        builder.push_bind(key_path(key));
        builder.push("::text[])::float8 END)");
        builder.push(op);
        builder.push_bind(value);
    }
    if first {
        builder.push("TRUE");
    }
    builder.push(")");
}

fn key_path(key: &str) -> Vec<String> {
    key.split('.').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(filter: &MetadataFilter) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_filter(&mut builder, "m.metadata", filter);
        builder.sql().to_string()
    }

    #[test]
    fn json_path_leaf_binds_the_path() {
        assert_eq!(
            compile(&MetadataFilter::json_path("$.author ? (@ == \"alice\")")),
            "jsonb_path_exists(m.metadata, $1::jsonpath)"
        );
    }

    #[test]
    fn groups_nest_with_their_connectives() {
        let filter = MetadataFilter::All(vec![
            MetadataFilter::json_path("$.a"),
            MetadataFilter::Any(vec![
                MetadataFilter::json_path("$.b"),
                MetadataFilter::json_path("$.c"),
            ]),
        ]);
        assert_eq!(
            compile(&filter),
            "(jsonb_path_exists(m.metadata, $1::jsonpath) AND \
             (jsonb_path_exists(m.metadata, $2::jsonpath) OR \
             jsonb_path_exists(m.metadata, $3::jsonpath)))"
        );
    }

    #[test]
    fn eq_and_in_compare_jsonb_values() {
        assert_eq!(
            compile(&MetadataFilter::Eq("source.kind".into(), json!("web"))),
            "(m.metadata #> $1::text[] = $2::jsonb)"
        );
        assert_eq!(
            compile(&MetadataFilter::In("kind".into(), vec![json!(1), json!(2)])),
            "(m.metadata #> $1::text[] IN ($2::jsonb, $3::jsonb))"
        );
    }

    #[test]
    fn range_guards_the_numeric_cast() {
        let sql = compile(&MetadataFilter::Range {
            key: "year".into(),
            min: Some(json!(2020)),
            max: None,
        });
        assert_eq!(
            sql,
            "((CASE WHEN jsonb_typeof(m.metadata #> $1::text[]) = 'number' \
             THEN (m.metadata #>> $2::text[])::float8 END) >= $3)"
        );
    }

    #[test]
    fn range_with_non_numeric_bound_is_false() {
        let sql = compile(&MetadataFilter::Range {
            key: "year".into(),
            min: Some(json!("soon")),
            max: None,
        });
        assert_eq!(sql, "FALSE");
    }

    #[test]
    fn key_paths_split_on_dots() {
        assert_eq!(key_path("a.b.c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn date_range_is_inclusive() {
        let mut builder = QueryBuilder::<Postgres>::new("WHERE TRUE");
        push_date_range(&mut builder, "m.created_at", Some(Utc::now()), Some(Utc::now()));
        assert_eq!(
            builder.sql(),
            "WHERE TRUE AND m.created_at >= $1 AND m.created_at <= $2"
        );
    }
}
