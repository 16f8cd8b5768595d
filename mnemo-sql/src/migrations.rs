use sqlx::PgPool;

use crate::error::SqlError;
use crate::schema::{migration_statements, SchemaDimensions};

pub async fn run_migrations(pool: &PgPool, dims: SchemaDimensions) -> Result<(), SqlError> {
    for statement in migration_statements(dims) {
        sqlx::query(&statement)
            .execute(pool)
            .await
            .map_err(SqlError::Migration)?;
    }
    tracing::debug!(
        message_dims = dims.message,
        summary_dims = dims.summary,
        "mnemo schema migrations applied"
    );
    Ok(())
}
