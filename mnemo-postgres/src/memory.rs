use async_trait::async_trait;
use mnemo_core::{Message, SearchQuery, SearchResult, StoreError, Summary};
use mnemo_memory::MemoryStore;
use mnemo_sql::map_sqlx;
use uuid::Uuid;

use crate::messages::{decode_messages, MESSAGE_COLUMNS};
use crate::PostgresMemoryStore;

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl MemoryStore for PostgresMemoryStore {
    async fn latest_summary(&self, session_id: &str) -> Result<Option<Summary>, StoreError> {
        self.get_summary(session_id).await
    }

    async fn last_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM (\
             SELECT id, {MESSAGE_COLUMNS} FROM message \
             WHERE session_id = $1 AND deleted_at IS NULL ORDER BY id DESC LIMIT $2\
             ) recent ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx("get last messages", error))?;
        decode_messages(&rows)
    }

    async fn messages_since(
        &self,
        session_id: &str,
        checkpoint: Uuid,
        limit: usize,
    ) -> Result<Option<Vec<Message>>, StoreError> {
        let checkpoint_id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM message WHERE session_id = $1 AND uuid = $2 AND deleted_at IS NULL",
        )
        .bind(session_id)
        .bind(checkpoint)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx("resolve summary checkpoint", error))?;
        let Some(checkpoint_id) = checkpoint_id else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM (\
             SELECT id, {MESSAGE_COLUMNS} FROM message \
             WHERE session_id = $1 AND id > $2 AND deleted_at IS NULL ORDER BY id DESC LIMIT $3\
             ) recent ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .bind(checkpoint_id)
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx("get messages since checkpoint", error))?;
        decode_messages(&rows).map(Some)
    }

    async fn search_summaries(
        &self,
        session_id: &str,
        query: &SearchQuery,
        limit: usize,
    ) -> Result<Vec<SearchResult<Summary>>, StoreError> {
        PostgresMemoryStore::search_summaries(self, session_id, query, limit).await
    }
}
