use std::collections::HashMap;

use mnemo_core::tasks::MESSAGE_EMBEDDER_TOPIC;
use mnemo_core::{
    check_dimensions, DocumentType, EmbeddingTask, EmbeddingUpdate, Message, MessagePage,
    Metadata, MetadataTarget, NewMessage, SearchQuery, SearchResult, StoreError,
};
use mnemo_sql::map_sqlx;
use mnemo_sql::rows::message_from_row;
use mnemo_sql::schema::{MESSAGE_EMBEDDING_TABLE, MESSAGE_TABLE};
use pgvector::Vector;
use sqlx::types::Json;
use sqlx::{PgConnection, Postgres, QueryBuilder, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::publish::routing;
use crate::search::PgSearchBackend;
use crate::sessions::require_session_id;
use crate::PostgresMemoryStore;

pub(crate) const MESSAGE_COLUMNS: &str = "uuid, created_at, role, content, token_count, metadata";

impl PostgresMemoryStore {
    /// Appends messages in order, creating the session on first write.
    ///
    /// Each message gets an embedding row; it is filled inline when no task
    /// publisher is configured, otherwise the contents are published after
    /// commit and the row stays pending until the embedding comes back.
    pub async fn put_messages(
        &self,
        session_id: &str,
        messages: Vec<NewMessage>,
    ) -> Result<Vec<Message>, StoreError> {
        require_session_id(session_id)?;
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let span = tracing::info_span!("put_messages", session_id, count = messages.len());
        let stored = self
            .insert_messages(session_id, messages)
            .instrument(span)
            .await?;

        if !self.embeds_inline() {
            let tasks = stored
                .iter()
                .map(|message| EmbeddingTask {
                    uuid: message.uuid,
                    content: message.content.clone(),
                })
                .collect();
            self.publish_tasks(
                MESSAGE_EMBEDDER_TOPIC,
                routing("session_id", session_id),
                tasks,
            )
            .await;
        }
        Ok(stored)
    }

    async fn insert_messages(
        &self,
        session_id: &str,
        messages: Vec<NewMessage>,
    ) -> Result<Vec<Message>, StoreError> {
        let uuids: Vec<Uuid> = messages
            .iter()
            .map(|message| message.uuid.unwrap_or_else(Uuid::new_v4))
            .collect();
        let mut embeddings: HashMap<Uuid, Vec<f32>> = if self.embeds_inline() {
            let texts: Vec<String> = messages.iter().map(|m| m.content.clone()).collect();
            let vectors = self.embed_inline(DocumentType::Message, &texts).await?;
            uuids.iter().copied().zip(vectors).collect()
        } else {
            HashMap::new()
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx("begin put messages", error))?;
        ensure_session(&mut *tx, session_id).await?;

        let mut insert = QueryBuilder::<Postgres>::new(
            "INSERT INTO message (uuid, session_id, role, content, token_count, metadata) ",
        );
        insert.push_values(uuids.iter().zip(&messages), |mut row, (uuid, message)| {
            row.push_bind(*uuid)
                .push_bind(session_id.to_string())
                .push_bind(message.role.clone())
                .push_bind(message.content.clone())
                .push_bind(message.token_count)
                .push_bind(Json(message.metadata.clone()));
        });
        insert.push(" RETURNING id, ");
        insert.push(MESSAGE_COLUMNS);
        let rows = insert
            .build()
            .fetch_all(&mut *tx)
            .await
            .map_err(|error| map_sqlx("put messages", error))?;

        let mut sequenced = rows
            .iter()
            .map(|row| Ok((row.try_get::<i64, _>("id")?, message_from_row(row)?)))
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|error| map_sqlx("decode message", error))?;
        sequenced.sort_by_key(|(id, _)| *id);
        let stored: Vec<Message> = sequenced.into_iter().map(|(_, message)| message).collect();

        let mut pending = QueryBuilder::<Postgres>::new(
            "INSERT INTO message_embedding (uuid, message_uuid, session_id, embedding, is_embedded) ",
        );
        pending.push_values(&stored, |mut row, message| {
            let embedding = embeddings.remove(&message.uuid).map(Vector::from);
            let embedded = embedding.is_some();
            row.push_bind(Uuid::new_v4())
                .push_bind(message.uuid)
                .push_bind(session_id.to_string())
                .push_bind(embedding)
                .push_bind(embedded);
        });
        pending
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|error| map_sqlx("put message embeddings", error))?;

        tx.commit()
            .await
            .map_err(|error| map_sqlx("commit put messages", error))?;
        Ok(stored)
    }

    /// One page of live messages in sequence order; `page` starts at 1.
    pub async fn get_message_list(
        &self,
        session_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<MessagePage, StoreError> {
        require_session_id(session_id)?;
        if page == 0 || page_size == 0 {
            return Err(StoreError::invalid("page and page_size must be greater than 0"));
        }
        let total_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM message WHERE session_id = $1 AND deleted_at IS NULL",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_sqlx("count messages", error))?;

        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM message WHERE session_id = $1 AND deleted_at IS NULL \
             ORDER BY id LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .bind(i64::from(page_size))
            .bind(i64::from(page - 1) * i64::from(page_size))
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx("get message list", error))?;

        Ok(MessagePage {
            messages: decode_messages(&rows)?,
            total_count,
            page,
            page_size,
        })
    }

    pub async fn get_messages_by_uuid(
        &self,
        session_id: &str,
        uuids: &[Uuid],
    ) -> Result<Vec<Message>, StoreError> {
        require_session_id(session_id)?;
        if uuids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM message \
             WHERE session_id = $1 AND uuid = ANY($2) AND deleted_at IS NULL ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .bind(uuids.to_vec())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx("get messages by uuid", error))?;
        decode_messages(&rows)
    }

    /// Deep-merges `patch` into a live message's metadata under its advisory lock.
    pub async fn update_message_metadata(
        &self,
        session_id: &str,
        uuid: Uuid,
        patch: Metadata,
        privileged: bool,
    ) -> Result<Metadata, StoreError> {
        require_session_id(session_id)?;
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM message \
             WHERE session_id = $1 AND uuid = $2 AND deleted_at IS NULL)",
        )
        .bind(session_id)
        .bind(uuid)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_sqlx("find message", error))?;
        if !exists {
            return Err(StoreError::not_found("message", uuid));
        }
        let target = MetadataTarget::new(MESSAGE_TABLE, "uuid", uuid.to_string());
        self.merger.merge(&target, patch, privileged).await
    }

    pub async fn put_message_embeddings(
        &self,
        session_id: &str,
        updates: &[EmbeddingUpdate],
    ) -> Result<usize, StoreError> {
        self.apply_session_embeddings(
            MESSAGE_EMBEDDING_TABLE,
            "message_uuid",
            DocumentType::Message,
            session_id,
            updates,
        )
        .await
    }

    pub async fn search_messages(
        &self,
        session_id: &str,
        query: &SearchQuery,
        limit: usize,
    ) -> Result<Vec<SearchResult<Message>>, StoreError> {
        require_session_id(session_id)?;
        let backend = PgSearchBackend::messages(
            &self.pool,
            session_id,
            self.dimensions(DocumentType::Message),
        );
        let span = tracing::info_span!("search_messages", session_id, limit);
        self.search.search(&backend, query, limit).instrument(span).await
    }

    /// Fills embedding rows of one session and returns how many were written.
    ///
    /// Rows that no longer exist are skipped.
    pub(crate) async fn apply_session_embeddings(
        &self,
        table: &'static str,
        owner_column: &'static str,
        kind: DocumentType,
        session_id: &str,
        updates: &[EmbeddingUpdate],
    ) -> Result<usize, StoreError> {
        require_session_id(session_id)?;
        let expected = self.dimensions(kind);
        for update in updates {
            check_dimensions(expected, &update.embedding)?;
        }
        if updates.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "UPDATE {table} SET embedding = $1, is_embedded = TRUE, updated_at = now() \
             WHERE {owner_column} = $2 AND session_id = $3 AND deleted_at IS NULL"
        );
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx("begin embedding update", error))?;
        let mut skipped = 0usize;
        for update in updates {
            let result = sqlx::query(&sql)
                .bind(Vector::from(update.embedding.clone()))
                .bind(update.uuid)
                .bind(session_id)
                .execute(&mut *tx)
                .await
                .map_err(|error| map_sqlx("update embedding", error))?;
            if result.rows_affected() == 0 {
                skipped += 1;
            }
        }
        tx.commit()
            .await
            .map_err(|error| map_sqlx("commit embedding update", error))?;

        if skipped > 0 {
            tracing::warn!(
                table,
                session_id,
                skipped,
                "embedding updates for missing or deleted rows skipped"
            );
        }
        Ok(updates.len() - skipped)
    }
}

/// Creates the session row if absent; a soft-deleted session rejects writes.
async fn ensure_session(connection: &mut PgConnection, session_id: &str) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO session (uuid, session_id) VALUES ($1, $2) ON CONFLICT (session_id) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind(session_id)
    .execute(&mut *connection)
    .await
    .map_err(|error| map_sqlx("create session", error))?;

    let deleted: bool = sqlx::query_scalar(
        "SELECT deleted_at IS NOT NULL FROM session WHERE session_id = $1",
    )
    .bind(session_id)
    .fetch_one(&mut *connection)
    .await
    .map_err(|error| map_sqlx("get session", error))?;
    if deleted {
        return Err(StoreError::not_found("session", session_id));
    }
    Ok(())
}

pub(crate) fn decode_messages(rows: &[sqlx::postgres::PgRow]) -> Result<Vec<Message>, StoreError> {
    rows.iter()
        .map(message_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| map_sqlx("decode message", error))
}
