use async_trait::async_trait;
use mnemo_core::{LockManager, Metadata, MetadataRepository, MetadataTarget, StoreError};
use mnemo_sql::map_sqlx;
use mnemo_sql::naming::validate_identifier;
use sqlx::pool::PoolConnection;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row};

/// Session-level advisory locks (`pg_advisory_lock`).
///
/// Advisory locks belong to the database session that took them, so each
/// guard pins one pooled connection until it is unlocked. Waiters block
/// inside `pg_advisory_lock` holding a connection too; give the manager a
/// pool of its own, separate from the one the locked work runs on.
#[derive(Clone, Debug)]
pub struct PgLockManager {
    pool: PgPool,
}

impl PgLockManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PgLockGuard {
    key: i64,
    connection: Option<PoolConnection<Postgres>>,
}

impl PgLockGuard {
    /// The advisory lock key as Postgres sees it.
    pub fn key(&self) -> i64 {
        self.key
    }
}

impl Drop for PgLockGuard {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            // closing the session is the only synchronous way to release it,
            // and also abandons a pg_advisory_lock call still waiting
            tracing::warn!(key = self.key, "advisory lock guard dropped before unlock; closing connection");
            drop(connection.detach());
        }
    }
}

#[async_trait]
impl LockManager for PgLockManager {
    type Guard = PgLockGuard;

    async fn lock(&self, key: u64) -> Result<Self::Guard, StoreError> {
        let key = key as i64;
        let connection = self
            .pool
            .acquire()
            .await
            .map_err(|error| map_sqlx("acquire lock connection", error))?;
        // owned by the guard before waiting: a cancelled waiter must not hand
        // its session back to the pool with the lock request still queued
        let mut guard = PgLockGuard {
            key,
            connection: Some(connection),
        };
        if let Some(connection) = guard.connection.as_deref_mut() {
            sqlx::query("SELECT pg_advisory_lock($1)")
                .bind(key)
                .execute(connection)
                .await
                .map_err(|error| map_sqlx("pg_advisory_lock", error))?;
        }
        Ok(guard)
    }

    async fn unlock(&self, mut guard: Self::Guard) -> Result<(), StoreError> {
        let Some(connection) = guard.connection.as_deref_mut() else {
            return Ok(());
        };
        let released: bool = sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
            .bind(guard.key)
            .fetch_one(connection)
            .await
            .map_err(|error| map_sqlx("pg_advisory_unlock", error))?;
        if !released {
            return Err(StoreError::storage(
                "pg_advisory_unlock",
                format!("advisory lock {} was not held", guard.key),
            ));
        }
        // back to the pool only once the session holds nothing
        drop(guard.connection.take());
        Ok(())
    }
}

/// Metadata column access for any table with `metadata` and `updated_at`.
///
/// Reads include soft-deleted rows.
#[derive(Clone, Debug)]
pub struct PgMetadataRepository {
    pool: PgPool,
}

impl PgMetadataRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn checked_target(target: &MetadataTarget) -> Result<(&str, &str), StoreError> {
    validate_identifier(&target.table)?;
    validate_identifier(&target.key_field)?;
    Ok((&target.table, &target.key_field))
}

#[async_trait]
impl MetadataRepository for PgMetadataRepository {
    async fn read_metadata(&self, target: &MetadataTarget) -> Result<Option<Metadata>, StoreError> {
        let (table, key_field) = checked_target(target)?;
        let sql = format!("SELECT metadata FROM {table} WHERE {key_field}::text = $1");
        let row = sqlx::query(&sql)
            .bind(&target.key_value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx("read metadata", error))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let metadata: Option<Json<Metadata>> = row
            .try_get("metadata")
            .map_err(|error| map_sqlx("read metadata", error))?;
        Ok(Some(metadata.map(|Json(metadata)| metadata).unwrap_or_default()))
    }

    async fn write_metadata(
        &self,
        target: &MetadataTarget,
        metadata: &Metadata,
    ) -> Result<(), StoreError> {
        let (table, key_field) = checked_target(target)?;
        let sql = format!(
            "UPDATE {table} SET metadata = $1, updated_at = now() WHERE {key_field}::text = $2"
        );
        let result = sqlx::query(&sql)
            .bind(Json(metadata))
            .bind(&target.key_value)
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx("write metadata", error))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("entity", target.lock_name()));
        }
        Ok(())
    }
}
