use mnemo_core::StoreError;
use mnemo_retrieval::SearchPlan;
use pgvector::Vector;
use sqlx::{Postgres, QueryBuilder};

use crate::filter::{push_date_range, push_filter};
use crate::naming::validate_identifier;

/// Which rows a search runs over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchScope<'a> {
    Messages { session_id: &'a str },
    Summaries { session_id: &'a str },
    Documents { table: &'a str },
}

struct ScopeColumns {
    alias: &'static str,
    embedding: &'static str,
    order_fallback: &'static str,
}

impl SearchScope<'_> {
    fn columns(&self) -> ScopeColumns {
        match self {
            SearchScope::Messages { .. } => ScopeColumns {
                alias: "m",
                embedding: "e.embedding",
                order_fallback: "m.id",
            },
            SearchScope::Summaries { .. } => ScopeColumns {
                alias: "s",
                embedding: "e.embedding",
                order_fallback: "s.id",
            },
            SearchScope::Documents { .. } => ScopeColumns {
                alias: "d",
                embedding: "d.embedding",
                order_fallback: "d.created_at, d.uuid",
            },
        }
    }
}

/// Builds the candidate query for one search.
///
/// Result columns: the scope's row columns, `embedding` (NULL unless needed)
/// and `dist`, the cosine similarity `1 - (embedding <=> query)` (NULL without
/// a query vector). Deleted rows are always excluded; rows are ordered by
/// distance when a query vector is present.
pub fn build_search_query(
    scope: &SearchScope<'_>,
    plan: &SearchPlan,
) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    if plan.limit == 0 {
        return Err(StoreError::invalid("search limit must be greater than 0"));
    }
    let columns = scope.columns();
    let query_vector = plan
        .query_embedding
        .as_ref()
        .map(|embedding| Vector::from(embedding.clone()));

    let mut builder = QueryBuilder::new("SELECT ");
    match scope {
        SearchScope::Messages { .. } => {
            builder.push("m.uuid, m.created_at, m.role, m.content, m.token_count, m.metadata");
        }
        SearchScope::Summaries { .. } => {
            builder.push(
                "s.uuid, s.created_at, s.content, s.summary_point_uuid, s.token_count, s.metadata",
            );
        }
        SearchScope::Documents { .. } => {
            builder.push(
                "d.uuid, d.created_at, d.updated_at, d.document_id, d.content, d.metadata, d.is_embedded",
            );
        }
    }

    let documents = matches!(scope, SearchScope::Documents { .. });
    if documents || plan.with_embeddings {
        builder.push(", ");
        builder.push(columns.embedding);
        builder.push(" AS embedding");
    } else {
        builder.push(", NULL::vector AS embedding");
    }

    match &query_vector {
        Some(vector) => {
            builder.push(", (1 - (");
            builder.push(columns.embedding);
            builder.push(" <=> ");
            builder.push_bind(vector.clone());
            builder.push("))::float4 AS dist");
        }
        None => {
            builder.push(", NULL::float4 AS dist");
        }
    }

    let join = if query_vector.is_some() { " JOIN " } else { " LEFT JOIN " };
    match scope {
        SearchScope::Messages { session_id } => {
            builder.push(" FROM message m");
            builder.push(join);
            builder.push("message_embedding e ON e.message_uuid = m.uuid");
            builder.push(" WHERE m.session_id = ");
            builder.push_bind(session_id.to_string());
            builder.push(" AND m.deleted_at IS NULL");
        }
        SearchScope::Summaries { session_id } => {
            builder.push(" FROM summary s");
            builder.push(join);
            builder.push("summary_embedding e ON e.summary_uuid = s.uuid");
            builder.push(" WHERE s.session_id = ");
            builder.push_bind(session_id.to_string());
            builder.push(" AND s.deleted_at IS NULL");
        }
        SearchScope::Documents { table } => {
            validate_identifier(table)?;
            builder.push(" FROM ");
            builder.push(*table);
            builder.push(" d WHERE d.deleted_at IS NULL");
        }
    }

    if query_vector.is_some() {
        builder.push(" AND ");
        builder.push(columns.embedding);
        builder.push(" IS NOT NULL");
        builder.push(if documents {
            " AND d.is_embedded"
        } else {
            " AND e.is_embedded"
        });
    }

    if let Some(filter) = &plan.metadata {
        builder.push(" AND ");
        push_filter(&mut builder, &format!("{}.metadata", columns.alias), filter);
    }
    push_date_range(
        &mut builder,
        &format!("{}.created_at", columns.alias),
        plan.start_date,
        plan.end_date,
    );

    if let (Some(vector), Some(min_score)) = (&query_vector, plan.min_score) {
        builder.push(" AND (1 - (");
        builder.push(columns.embedding);
        builder.push(" <=> ");
        builder.push_bind(vector.clone());
        builder.push(")) >= ");
        builder.push_bind(f64::from(min_score));
    }

    builder.push(" ORDER BY ");
    match query_vector {
        Some(vector) => {
            builder.push(columns.embedding);
            builder.push(" <=> ");
            builder.push_bind(vector);
        }
        None => {
            builder.push(columns.order_fallback);
        }
    }

    builder.push(" LIMIT ");
    builder.push_bind(i64::try_from(plan.limit).unwrap_or(i64::MAX));
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::MetadataFilter;

    fn plan() -> SearchPlan {
        SearchPlan {
            query_embedding: None,
            metadata: None,
            start_date: None,
            end_date: None,
            min_score: None,
            limit: 5,
            with_embeddings: false,
        }
    }

    #[test]
    fn message_similarity_query_orders_by_cosine_distance() {
        let plan = SearchPlan {
            query_embedding: Some(vec![0.1, 0.2]),
            min_score: Some(0.7),
            ..plan()
        };
        let builder =
            build_search_query(&SearchScope::Messages { session_id: "s1" }, &plan).unwrap();
        assert_eq!(
            builder.sql(),
            "SELECT m.uuid, m.created_at, m.role, m.content, m.token_count, m.metadata, \
             NULL::vector AS embedding, (1 - (e.embedding <=> $1))::float4 AS dist \
             FROM message m JOIN message_embedding e ON e.message_uuid = m.uuid \
             WHERE m.session_id = $2 AND m.deleted_at IS NULL \
             AND e.embedding IS NOT NULL AND e.is_embedded \
             AND (1 - (e.embedding <=> $3)) >= $4 \
             ORDER BY e.embedding <=> $5 LIMIT $6"
        );
    }

    #[test]
    fn metadata_only_summary_query_keeps_unembedded_rows() {
        let plan = SearchPlan {
            metadata: Some(MetadataFilter::json_path("$.topic")),
            ..plan()
        };
        let builder =
            build_search_query(&SearchScope::Summaries { session_id: "s1" }, &plan).unwrap();
        assert_eq!(
            builder.sql(),
            "SELECT s.uuid, s.created_at, s.content, s.summary_point_uuid, s.token_count, s.metadata, \
             NULL::vector AS embedding, NULL::float4 AS dist \
             FROM summary s LEFT JOIN summary_embedding e ON e.summary_uuid = s.uuid \
             WHERE s.session_id = $1 AND s.deleted_at IS NULL \
             AND jsonb_path_exists(s.metadata, $2::jsonpath) \
             ORDER BY s.id LIMIT $3"
        );
    }

    #[test]
    fn document_mmr_query_returns_embeddings() {
        let plan = SearchPlan {
            query_embedding: Some(vec![1.0; 3]),
            with_embeddings: true,
            limit: 10,
            ..plan()
        };
        let builder = build_search_query(
            &SearchScope::Documents {
                table: "docstore_notes_3",
            },
            &plan,
        )
        .unwrap();
        let sql = builder.sql();
        assert!(sql.contains(", d.embedding AS embedding, "));
        assert!(sql.contains(" FROM docstore_notes_3 d WHERE d.deleted_at IS NULL"));
        assert!(sql.contains(" AND d.embedding IS NOT NULL AND d.is_embedded"));
        assert!(sql.ends_with("ORDER BY d.embedding <=> $2 LIMIT $3"));
    }

    #[test]
    fn rejects_unsafe_tables_and_zero_limit() {
        let Err(err) = build_search_query(
            &SearchScope::Documents {
                table: "docs; DROP TABLE users",
            },
            &plan(),
        ) else {
            panic!("unsafe table name was accepted");
        };
        assert!(matches!(err, StoreError::InvalidArgument(_)));

        let Err(err) = build_search_query(
            &SearchScope::Messages { session_id: "s1" },
            &SearchPlan { limit: 0, ..plan() },
        ) else {
            panic!("zero limit was accepted");
        };
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }
}
