use mnemo_core::tasks::SUMMARY_EMBEDDER_TOPIC;
use mnemo_core::{
    DocumentType, EmbeddingTask, EmbeddingUpdate, NewSummary, SearchQuery, SearchResult,
    StoreError, Summary, SummaryPage,
};
use mnemo_sql::map_sqlx;
use mnemo_sql::rows::summary_from_row;
use mnemo_sql::schema::SUMMARY_EMBEDDING_TABLE;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use tracing::Instrument;
use uuid::Uuid;

use crate::publish::routing;
use crate::search::PgSearchBackend;
use crate::sessions::require_session_id;
use crate::PostgresMemoryStore;

pub(crate) const SUMMARY_COLUMNS: &str =
    "uuid, created_at, content, summary_point_uuid, token_count, metadata";

impl PostgresMemoryStore {
    /// Stores a summary whose checkpoint must be a live message of the session.
    pub async fn put_summary(
        &self,
        session_id: &str,
        summary: NewSummary,
    ) -> Result<Summary, StoreError> {
        require_session_id(session_id)?;
        let span = tracing::info_span!(
            "put_summary",
            session_id,
            summary_point_uuid = %summary.summary_point_uuid
        );
        let stored = self
            .insert_summary(session_id, summary)
            .instrument(span)
            .await?;

        if !self.embeds_inline() {
            let task = EmbeddingTask {
                uuid: stored.uuid,
                content: stored.content.clone(),
            };
            self.publish_tasks(
                SUMMARY_EMBEDDER_TOPIC,
                routing("session_id", session_id),
                vec![task],
            )
            .await;
        }
        Ok(stored)
    }

    async fn insert_summary(
        &self,
        session_id: &str,
        summary: NewSummary,
    ) -> Result<Summary, StoreError> {
        let embedding = if self.embeds_inline() {
            self.embed_inline(DocumentType::Summary, &[summary.content.clone()])
                .await?
                .pop()
                .map(Vector::from)
        } else {
            None
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx("begin put summary", error))?;

        let checkpoint_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM message \
             WHERE session_id = $1 AND uuid = $2 AND deleted_at IS NULL)",
        )
        .bind(session_id)
        .bind(summary.summary_point_uuid)
        .fetch_one(&mut *tx)
        .await
        .map_err(|error| map_sqlx("find summary checkpoint", error))?;
        if !checkpoint_exists {
            return Err(StoreError::not_found("message", summary.summary_point_uuid));
        }

        let sql = format!(
            "INSERT INTO summary (uuid, session_id, summary_point_uuid, content, token_count, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {SUMMARY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(session_id)
            .bind(summary.summary_point_uuid)
            .bind(&summary.content)
            .bind(summary.token_count)
            .bind(Json(&summary.metadata))
            .fetch_one(&mut *tx)
            .await
            .map_err(|error| map_sqlx("put summary", error))?;
        let stored = summary_from_row(&row).map_err(|error| map_sqlx("decode summary", error))?;

        let embedded = embedding.is_some();
        sqlx::query(
            "INSERT INTO summary_embedding (uuid, summary_uuid, session_id, embedding, is_embedded) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(stored.uuid)
        .bind(session_id)
        .bind(embedding)
        .bind(embedded)
        .execute(&mut *tx)
        .await
        .map_err(|error| map_sqlx("put summary embedding", error))?;

        tx.commit()
            .await
            .map_err(|error| map_sqlx("commit put summary", error))?;
        Ok(stored)
    }

    /// The session's latest live summary.
    pub async fn get_summary(&self, session_id: &str) -> Result<Option<Summary>, StoreError> {
        require_session_id(session_id)?;
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM summary WHERE session_id = $1 AND deleted_at IS NULL \
             ORDER BY id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx("get summary", error))?;
        row.as_ref()
            .map(summary_from_row)
            .transpose()
            .map_err(|error| map_sqlx("decode summary", error))
    }

    pub async fn get_summary_by_uuid(
        &self,
        session_id: &str,
        uuid: Uuid,
    ) -> Result<Summary, StoreError> {
        require_session_id(session_id)?;
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM summary \
             WHERE session_id = $1 AND uuid = $2 AND deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(session_id)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx("get summary", error))?
            .ok_or_else(|| StoreError::not_found("summary", uuid))?;
        summary_from_row(&row).map_err(|error| map_sqlx("decode summary", error))
    }

    /// One page of live summaries, oldest first; `page` starts at 1.
    pub async fn get_summary_list(
        &self,
        session_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<SummaryPage, StoreError> {
        require_session_id(session_id)?;
        if page == 0 || page_size == 0 {
            return Err(StoreError::invalid("page and page_size must be greater than 0"));
        }
        let total_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM summary WHERE session_id = $1 AND deleted_at IS NULL",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_sqlx("count summaries", error))?;

        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM summary WHERE session_id = $1 AND deleted_at IS NULL \
             ORDER BY id LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .bind(i64::from(page_size))
            .bind(i64::from(page - 1) * i64::from(page_size))
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx("get summary list", error))?;

        Ok(SummaryPage {
            summaries: decode_summaries(&rows)?,
            total_count,
            page,
            page_size,
        })
    }

    pub async fn put_summary_embedding(
        &self,
        session_id: &str,
        update: EmbeddingUpdate,
    ) -> Result<usize, StoreError> {
        self.apply_session_embeddings(
            SUMMARY_EMBEDDING_TABLE,
            "summary_uuid",
            DocumentType::Summary,
            session_id,
            std::slice::from_ref(&update),
        )
        .await
    }

    pub async fn search_summaries(
        &self,
        session_id: &str,
        query: &SearchQuery,
        limit: usize,
    ) -> Result<Vec<SearchResult<Summary>>, StoreError> {
        require_session_id(session_id)?;
        let backend = PgSearchBackend::summaries(
            &self.pool,
            session_id,
            self.dimensions(DocumentType::Summary),
        );
        let span = tracing::info_span!("search_summaries", session_id, limit);
        self.search.search(&backend, query, limit).instrument(span).await
    }
}

pub(crate) fn decode_summaries(rows: &[PgRow]) -> Result<Vec<Summary>, StoreError> {
    rows.iter()
        .map(summary_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| map_sqlx("decode summary", error))
}
