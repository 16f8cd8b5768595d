use mnemo_core::{
    CreateSessionRequest, MetadataTarget, Session, SessionPage, StoreError, UpdateSessionRequest,
};
use mnemo_sql::map_sqlx;
use mnemo_sql::rows::session_from_row;
use mnemo_sql::schema::{
    MESSAGE_EMBEDDING_TABLE, MESSAGE_TABLE, SESSION_TABLE, SUMMARY_EMBEDDING_TABLE, SUMMARY_TABLE,
};
use sqlx::types::Json;
use tracing::Instrument;
use uuid::Uuid;

use crate::PostgresMemoryStore;

pub(crate) const SESSION_COLUMNS: &str =
    "id, uuid, session_id, user_id, metadata, created_at, updated_at, deleted_at";

pub(crate) fn require_session_id(session_id: &str) -> Result<(), StoreError> {
    if session_id.trim().is_empty() {
        return Err(StoreError::invalid("session_id must not be empty"));
    }
    Ok(())
}

impl PostgresMemoryStore {
    pub async fn create_session(&self, request: CreateSessionRequest) -> Result<Session, StoreError> {
        require_session_id(&request.session_id)?;
        let sql = format!(
            "INSERT INTO session (uuid, session_id, user_id, metadata) VALUES ($1, $2, $3, $4) \
             RETURNING {SESSION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(&request.session_id)
            .bind(&request.user_id)
            .bind(Json(&request.metadata))
            .fetch_one(&self.pool)
            .await
            .map_err(|error| map_sqlx("create session", error))?;
        session_from_row(&row).map_err(|error| map_sqlx("decode session", error))
    }

    /// Live session by key; soft-deleted sessions are `NotFound`.
    pub async fn get_session(&self, session_id: &str) -> Result<Session, StoreError> {
        require_session_id(session_id)?;
        match self.find_session(session_id).await? {
            Some(session) if !session.is_deleted() => Ok(session),
            _ => Err(StoreError::not_found("session", session_id)),
        }
    }

    /// Merges metadata and optionally undeletes. A deleted session is only
    /// reachable here with `undelete` set.
    pub async fn update_session(&self, request: UpdateSessionRequest) -> Result<Session, StoreError> {
        require_session_id(&request.session_id)?;
        let span = tracing::info_span!("update_session", session_id = %request.session_id);
        async move {
            let existing = self
                .find_session(&request.session_id)
                .await?
                .ok_or_else(|| StoreError::not_found("session", &request.session_id))?;
            if existing.is_deleted() {
                if !request.undelete {
                    return Err(StoreError::not_found("session", &request.session_id));
                }
                sqlx::query(
                    "UPDATE session SET deleted_at = NULL, updated_at = now() WHERE session_id = $1",
                )
                .bind(&request.session_id)
                .execute(&self.pool)
                .await
                .map_err(|error| map_sqlx("undelete session", error))?;
                tracing::info!("session undeleted");
            }

            if let Some(metadata) = request.metadata.filter(|metadata| !metadata.is_empty()) {
                let target = MetadataTarget::new(SESSION_TABLE, "session_id", &request.session_id);
                self.merger.merge(&target, metadata, false).await?;
            }
            self.get_session(&request.session_id).await
        }
        .instrument(span)
        .await
    }

    /// Soft-deletes the session and everything stored under it.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        require_session_id(session_id)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx("begin delete session", error))?;

        let deleted = sqlx::query(
            "UPDATE session SET deleted_at = now() WHERE session_id = $1 AND deleted_at IS NULL",
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await
        .map_err(|error| map_sqlx("delete session", error))?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::not_found("session", session_id));
        }

        for table in [
            "message",
            "message_embedding",
            "summary",
            "summary_embedding",
        ] {
            let sql = format!(
                "UPDATE {table} SET deleted_at = now() WHERE session_id = $1 AND deleted_at IS NULL"
            );
            sqlx::query(&sql)
                .bind(session_id)
                .execute(&mut *tx)
                .await
                .map_err(|error| map_sqlx("delete session rows", error))?;
        }

        tx.commit()
            .await
            .map_err(|error| map_sqlx("commit delete session", error))?;
        tracing::info!(session_id, "session deleted");
        Ok(())
    }

    /// Live sessions with `id > cursor`, in id order.
    pub async fn list_sessions(&self, cursor: i64, limit: usize) -> Result<SessionPage, StoreError> {
        if limit == 0 {
            return Err(StoreError::invalid("limit must be greater than 0"));
        }
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM session WHERE id > $1 AND deleted_at IS NULL \
             ORDER BY id LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(cursor)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx("list sessions", error))?;
        let sessions = rows
            .iter()
            .map(session_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| map_sqlx("decode session", error))?;
        let next_cursor = if sessions.len() == limit {
            sessions.last().map(|session| session.id)
        } else {
            None
        };
        Ok(SessionPage {
            sessions,
            next_cursor,
        })
    }

    /// Hard-deletes every soft-deleted row, children before parents.
    ///
    /// Returns the number of rows removed.
    pub async fn purge_deleted(&self) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx("begin purge", error))?;
        let mut purged = 0;

        for table in [
            SUMMARY_EMBEDDING_TABLE,
            MESSAGE_EMBEDDING_TABLE,
            SUMMARY_TABLE,
            MESSAGE_TABLE,
            SESSION_TABLE,
        ] {
            let sql = format!("DELETE FROM {table} WHERE deleted_at IS NOT NULL");
            purged += sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|error| map_sqlx("purge deleted rows", error))?
                .rows_affected();
        }

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT table_name FROM document_collection WHERE deleted_at IS NULL",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|error| map_sqlx("list collection tables", error))?;
        for table in tables {
            mnemo_sql::naming::validate_identifier(&table)?;
            let sql = format!("DELETE FROM {table} WHERE deleted_at IS NOT NULL");
            purged += sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|error| map_sqlx("purge deleted documents", error))?
                .rows_affected();
        }

        tx.commit()
            .await
            .map_err(|error| map_sqlx("commit purge", error))?;
        tracing::info!(purged, "purged soft-deleted rows");
        Ok(purged)
    }

    /// Session row regardless of soft-deletion.
    pub(crate) async fn find_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM session WHERE session_id = $1");
        let row = sqlx::query(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx("get session", error))?;
        row.as_ref()
            .map(session_from_row)
            .transpose()
            .map_err(|error| map_sqlx("decode session", error))
    }
}
