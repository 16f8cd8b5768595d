use mnemo_core::StoreError;

use crate::index::IvfFlatParams;
use crate::naming::validate_identifier;

pub const SESSION_TABLE: &str = "session";
pub const MESSAGE_TABLE: &str = "message";
pub const MESSAGE_EMBEDDING_TABLE: &str = "message_embedding";
pub const SUMMARY_TABLE: &str = "summary";
pub const SUMMARY_EMBEDDING_TABLE: &str = "summary_embedding";
pub const DOCUMENT_COLLECTION_TABLE: &str = "document_collection";

pub const CREATE_VECTOR_EXTENSION_SQL: &str = "CREATE EXTENSION IF NOT EXISTS vector";

pub const CREATE_USERS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS users (\
    id BIGSERIAL PRIMARY KEY,\
    uuid UUID NOT NULL UNIQUE,\
    user_id TEXT NOT NULL UNIQUE,\
    email TEXT,\
    first_name TEXT,\
    last_name TEXT,\
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,\
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),\
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),\
    deleted_at TIMESTAMPTZ\
)";

pub const CREATE_SESSION_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS session (\
    id BIGSERIAL PRIMARY KEY,\
    uuid UUID NOT NULL UNIQUE,\
    session_id TEXT NOT NULL UNIQUE,\
    user_id TEXT,\
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,\
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),\
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),\
    deleted_at TIMESTAMPTZ\
)";

pub const CREATE_SESSION_USER_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS session_user_id_idx ON session (user_id)";

pub const CREATE_MESSAGE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS message (\
    id BIGSERIAL PRIMARY KEY,\
    uuid UUID NOT NULL UNIQUE,\
    session_id TEXT NOT NULL REFERENCES session (session_id) ON DELETE CASCADE,\
    role TEXT NOT NULL,\
    content TEXT NOT NULL,\
    token_count INTEGER NOT NULL DEFAULT 0,\
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,\
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),\
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),\
    deleted_at TIMESTAMPTZ\
)";

pub const CREATE_MESSAGE_SESSION_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS message_session_id_idx ON message (session_id, id)";

pub const CREATE_SUMMARY_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS summary (\
    id BIGSERIAL PRIMARY KEY,\
    uuid UUID NOT NULL UNIQUE,\
    session_id TEXT NOT NULL REFERENCES session (session_id) ON DELETE CASCADE,\
    summary_point_uuid UUID NOT NULL REFERENCES message (uuid) ON DELETE CASCADE,\
    content TEXT NOT NULL,\
    token_count INTEGER NOT NULL DEFAULT 0,\
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,\
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),\
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),\
    deleted_at TIMESTAMPTZ\
)";

pub const CREATE_SUMMARY_SESSION_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS summary_session_id_idx ON summary (session_id, id)";

pub const CREATE_DOCUMENT_COLLECTION_TABLE_SQL: &str =
    "CREATE TABLE IF NOT EXISTS document_collection (\
    uuid UUID PRIMARY KEY,\
    name TEXT NOT NULL UNIQUE,\
    description TEXT NOT NULL DEFAULT '',\
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,\
    table_name TEXT NOT NULL UNIQUE,\
    embedding_model_name TEXT NOT NULL,\
    embedding_dimensions INTEGER NOT NULL,\
    is_auto_embedded BOOLEAN NOT NULL DEFAULT TRUE,\
    distance_function TEXT NOT NULL DEFAULT 'cosine',\
    is_normalized BOOLEAN NOT NULL DEFAULT TRUE,\
    is_indexed BOOLEAN NOT NULL DEFAULT FALSE,\
    index_type TEXT NOT NULL,\
    list_count INTEGER NOT NULL DEFAULT 0,\
    probe_count INTEGER NOT NULL DEFAULT 0,\
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),\
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),\
    deleted_at TIMESTAMPTZ\
)";

/// Embedding side table for messages or summaries, one row per owner.
fn embedding_table_sql(table: &str, owner_table: &str, owner_column: &str, dims: usize) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
         uuid UUID PRIMARY KEY,\
         {owner_column} UUID NOT NULL UNIQUE REFERENCES {owner_table} (uuid) ON DELETE CASCADE,\
         session_id TEXT NOT NULL,\
         embedding vector({dims}),\
         is_embedded BOOLEAN NOT NULL DEFAULT FALSE,\
         created_at TIMESTAMPTZ NOT NULL DEFAULT now(),\
         updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),\
         deleted_at TIMESTAMPTZ\
         )"
    )
}

pub fn create_message_embedding_table_sql(dims: usize) -> String {
    embedding_table_sql(MESSAGE_EMBEDDING_TABLE, MESSAGE_TABLE, "message_uuid", dims)
}

pub fn create_summary_embedding_table_sql(dims: usize) -> String {
    embedding_table_sql(SUMMARY_EMBEDDING_TABLE, SUMMARY_TABLE, "summary_uuid", dims)
}

/// Vector widths of the fixed embedding tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchemaDimensions {
    pub message: usize,
    pub summary: usize,
}

/// Idempotent DDL run at startup, in dependency order.
pub fn migration_statements(dims: SchemaDimensions) -> Vec<String> {
    vec![
        CREATE_VECTOR_EXTENSION_SQL.to_string(),
        CREATE_USERS_TABLE_SQL.to_string(),
        CREATE_SESSION_TABLE_SQL.to_string(),
        CREATE_SESSION_USER_INDEX_SQL.to_string(),
        CREATE_MESSAGE_TABLE_SQL.to_string(),
        CREATE_MESSAGE_SESSION_INDEX_SQL.to_string(),
        create_message_embedding_table_sql(dims.message),
        CREATE_SUMMARY_TABLE_SQL.to_string(),
        CREATE_SUMMARY_SESSION_INDEX_SQL.to_string(),
        create_summary_embedding_table_sql(dims.summary),
        CREATE_DOCUMENT_COLLECTION_TABLE_SQL.to_string(),
    ]
}

pub fn create_document_table_sql(table: &str, dims: usize) -> Result<String, StoreError> {
    validate_identifier(table)?;
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
         uuid UUID PRIMARY KEY,\
         document_id TEXT NOT NULL,\
         content TEXT NOT NULL DEFAULT '',\
         metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,\
         embedding vector({dims}),\
         is_embedded BOOLEAN NOT NULL DEFAULT FALSE,\
         created_at TIMESTAMPTZ NOT NULL DEFAULT now(),\
         updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),\
         deleted_at TIMESTAMPTZ\
         )"
    ))
}

pub fn create_document_id_index_sql(table: &str) -> Result<String, StoreError> {
    validate_identifier(table)?;
    Ok(format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {table}_document_id_idx ON {table} (document_id)"
    ))
}

pub fn embedding_index_name(table: &str) -> String {
    format!("{table}_embedding_idx")
}

/// Online (`CONCURRENTLY`) HNSW index; must run outside a transaction.
pub fn create_hnsw_index_sql(table: &str) -> Result<String, StoreError> {
    validate_identifier(table)?;
    Ok(format!(
        "CREATE INDEX CONCURRENTLY IF NOT EXISTS {index} ON {table} \
         USING hnsw (embedding vector_cosine_ops)",
        index = embedding_index_name(table)
    ))
}

/// Online (`CONCURRENTLY`) IVFFLAT index; must run outside a transaction.
pub fn create_ivfflat_index_sql(table: &str, params: IvfFlatParams) -> Result<String, StoreError> {
    validate_identifier(table)?;
    Ok(format!(
        "CREATE INDEX CONCURRENTLY IF NOT EXISTS {index} ON {table} \
         USING ivfflat (embedding vector_cosine_ops) WITH (lists = {lists})",
        index = embedding_index_name(table),
        lists = params.lists
    ))
}

pub fn drop_index_sql(table: &str) -> Result<String, StoreError> {
    validate_identifier(table)?;
    Ok(format!(
        "DROP INDEX CONCURRENTLY IF EXISTS {}",
        embedding_index_name(table)
    ))
}

pub fn drop_table_sql(table: &str) -> Result<String, StoreError> {
    validate_identifier(table)?;
    Ok(format!("DROP TABLE IF EXISTS {table}"))
}

/// Statements replacing a table's vector column with one of `dims` width.
/// Existing vectors are discarded and every row is marked unembedded.
pub fn migrate_embedding_width_sql(table: &str, dims: usize) -> Result<[String; 3], StoreError> {
    validate_identifier(table)?;
    if dims == 0 {
        return Err(StoreError::invalid(
            "embedding dimensions must be greater than 0",
        ));
    }
    Ok([
        format!("ALTER TABLE {table} DROP COLUMN IF EXISTS embedding"),
        format!("ALTER TABLE {table} ADD COLUMN embedding vector({dims})"),
        format!("UPDATE {table} SET is_embedded = FALSE, updated_at = now()"),
    ])
}

/// `SET LOCAL` for IVFFLAT searches; only valid inside a transaction.
pub fn set_ivfflat_probes_sql(probes: i32) -> String {
    format!("SET LOCAL ivfflat.probes = {}", probes.max(1))
}

/// Live document counts in a single aggregate pass.
pub fn collection_counts_sql(table: &str) -> Result<String, StoreError> {
    validate_identifier(table)?;
    Ok(format!(
        "SELECT \
         COUNT(*) FILTER (WHERE deleted_at IS NULL) AS document_count, \
         COUNT(*) FILTER (WHERE deleted_at IS NULL AND is_embedded) AS document_embedded_count \
         FROM {table}"
    ))
}

/// Width of a `vector(n)` column as recorded in the catalog.
pub const EMBEDDING_COLUMN_WIDTH_SQL: &str = "SELECT a.atttypmod FROM pg_attribute a \
    WHERE a.attrelid = to_regclass($1) AND a.attname = 'embedding' AND NOT a.attisdropped";

pub const PGVECTOR_VERSION_SQL: &str =
    "SELECT extversion FROM pg_extension WHERE extname = 'vector'";
