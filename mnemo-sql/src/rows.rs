//! Decoders from `PgRow` into the core domain types.
//!
//! Column names follow the `SELECT` lists in [`crate::search`] and the store's
//! own queries; `metadata` is read as nullable JSONB and defaults to `{}`.

use mnemo_core::{Document, DocumentCollection, Message, Metadata, Session, Summary};
use mnemo_retrieval::Candidate;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;

pub fn metadata_column(row: &PgRow, column: &str) -> Result<Metadata, sqlx::Error> {
    let value: Option<Json<Metadata>> = row.try_get(column)?;
    Ok(value.map(|Json(metadata)| metadata).unwrap_or_default())
}

pub fn embedding_column(row: &PgRow, column: &str) -> Result<Option<Vec<f32>>, sqlx::Error> {
    let value: Option<Vector> = row.try_get(column)?;
    Ok(value.map(|vector| vector.to_vec()))
}

pub fn session_from_row(row: &PgRow) -> Result<Session, sqlx::Error> {
    Ok(Session {
        id: row.try_get("id")?,
        uuid: row.try_get("uuid")?,
        session_id: row.try_get("session_id")?,
        user_id: row.try_get("user_id")?,
        metadata: metadata_column(row, "metadata")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

pub fn message_from_row(row: &PgRow) -> Result<Message, sqlx::Error> {
    Ok(Message {
        uuid: row.try_get("uuid")?,
        created_at: row.try_get("created_at")?,
        role: row.try_get("role")?,
        content: row.try_get("content")?,
        token_count: row.try_get("token_count")?,
        metadata: metadata_column(row, "metadata")?,
    })
}

pub fn summary_from_row(row: &PgRow) -> Result<Summary, sqlx::Error> {
    Ok(Summary {
        uuid: row.try_get("uuid")?,
        created_at: row.try_get("created_at")?,
        content: row.try_get("content")?,
        summary_point_uuid: row.try_get("summary_point_uuid")?,
        token_count: row.try_get("token_count")?,
        metadata: metadata_column(row, "metadata")?,
    })
}

pub fn document_from_row(row: &PgRow) -> Result<Document, sqlx::Error> {
    Ok(Document {
        uuid: row.try_get("uuid")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        document_id: row.try_get("document_id")?,
        content: row.try_get("content")?,
        metadata: metadata_column(row, "metadata")?,
        embedding: embedding_column(row, "embedding")?,
        is_embedded: row.try_get("is_embedded")?,
    })
}

/// Collection row; document counts are zero until the caller fills them in.
pub fn collection_from_row(row: &PgRow) -> Result<DocumentCollection, sqlx::Error> {
    let dimensions: i32 = row.try_get("embedding_dimensions")?;
    let distance_function: String = row.try_get("distance_function")?;
    let index_type: String = row.try_get("index_type")?;
    Ok(DocumentCollection {
        uuid: row.try_get("uuid")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        metadata: metadata_column(row, "metadata")?,
        table_name: row.try_get("table_name")?,
        embedding_model_name: row.try_get("embedding_model_name")?,
        embedding_dimensions: usize::try_from(dimensions)
            .map_err(|error| sqlx::Error::Decode(Box::new(error)))?,
        is_auto_embedded: row.try_get("is_auto_embedded")?,
        distance_function: distance_function
            .parse()
            .map_err(|error| sqlx::Error::Decode(Box::new(error)))?,
        is_normalized: row.try_get("is_normalized")?,
        is_indexed: row.try_get("is_indexed")?,
        index_type: index_type
            .parse()
            .map_err(|error| sqlx::Error::Decode(Box::new(error)))?,
        list_count: row.try_get("list_count")?,
        probe_count: row.try_get("probe_count")?,
        document_count: 0,
        document_embedded_count: 0,
    })
}

/// Wraps a decoded item with the `dist` and `embedding` columns of a search row.
pub fn candidate_from_row<T>(row: &PgRow, item: T) -> Result<Candidate<T>, sqlx::Error> {
    let dist: Option<f32> = row.try_get("dist")?;
    Ok(Candidate {
        item,
        dist,
        embedding: embedding_column(row, "embedding")?,
    })
}
