use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Metadata, StoreError};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// Graph-based index; buildable on an empty table.
    #[default]
    Hnsw,
    /// List-partitioned index; needs rows to train its centroids.
    IvfFlat,
}

impl IndexType {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexType::Hnsw => "hnsw",
            IndexType::IvfFlat => "ivfflat",
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexType {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "hnsw" => Ok(IndexType::Hnsw),
            "ivfflat" => Ok(IndexType::IvfFlat),
            other => Err(StoreError::invalid(format!("unknown index type '{other}'"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceFunction {
    #[default]
    Cosine,
}

impl DistanceFunction {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceFunction::Cosine => "cosine",
        }
    }
}

impl FromStr for DistanceFunction {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "cosine" => Ok(DistanceFunction::Cosine),
            other => Err(StoreError::invalid(format!(
                "unsupported distance function '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DocumentCollection {
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub table_name: String,
    pub embedding_model_name: String,
    pub embedding_dimensions: usize,
    pub is_auto_embedded: bool,
    pub distance_function: DistanceFunction,
    pub is_normalized: bool,
    pub is_indexed: bool,
    pub index_type: IndexType,
    pub list_count: i32,
    pub probe_count: i32,
    /// Live count of non-deleted documents.
    pub document_count: i64,
    /// Live count of non-deleted documents that carry an embedding.
    pub document_embedded_count: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CreateCollectionRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub embedding_dimensions: usize,
    #[serde(default)]
    pub is_auto_embedded: bool,
    #[serde(default)]
    pub is_normalized: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateCollectionRequest {
    pub name: String,
    pub description: Option<String>,
    /// Merged into stored metadata.
    pub metadata: Option<Metadata>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub document_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub embedding: Option<Vec<f32>>,
    pub is_embedded: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CreateDocumentRequest {
    pub document_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateDocumentRequest {
    pub uuid: Uuid,
    pub document_id: Option<String>,
    /// Replaces stored metadata.
    pub metadata: Option<Metadata>,
}

/// Selection for `get_documents`. With no ids and `limit == 0` every live document is returned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentSelection {
    pub limit: usize,
    pub uuids: Vec<Uuid>,
    pub document_ids: Vec<String>,
}

impl DocumentSelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn by_uuids(uuids: Vec<Uuid>) -> Self {
        Self {
            uuids,
            ..Self::default()
        }
    }
}
