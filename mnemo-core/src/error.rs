use std::{error::Error as StdError, fmt};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("storage error during {operation}: {source}")]
    Storage {
        operation: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("task publish failed: {0}")]
    Publish(String),
}

impl StoreError {
    pub fn invalid(message: impl Into<String>) -> Self {
        StoreError::InvalidArgument(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn storage(
        operation: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        StoreError::Storage {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Checks a vector against the width of the column it is headed for.
pub fn check_dimensions(expected: usize, embedding: &[f32]) -> Result<(), StoreError> {
    if embedding.len() != expected {
        return Err(StoreError::DimensionMismatch {
            expected,
            got: embedding.len(),
        });
    }
    Ok(())
}

/// Failure reported by an [`Embedder`](crate::Embedder).
#[derive(Debug)]
pub enum EmbeddingError {
    /// The embedder answered with the wrong number of vectors.
    CountMismatch { expected: usize, got: usize },
    /// The embedding backend itself failed.
    Backend(Box<dyn StdError + Send + Sync>),
}

impl EmbeddingError {
    pub fn backend(error: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        EmbeddingError::Backend(error.into())
    }
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingError::CountMismatch { expected, got } => {
                write!(f, "embedder returned {got} vectors for {expected} texts")
            }
            EmbeddingError::Backend(error) => write!(f, "embedding backend failed: {error}"),
        }
    }
}

impl StdError for EmbeddingError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            EmbeddingError::Backend(error) => Some(error.as_ref()),
            EmbeddingError::CountMismatch { .. } => None,
        }
    }
}
