use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{DocumentType, EmbeddingError};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingModel {
    pub name: String,
    pub dimensions: usize,
}

/// Turns text into vectors. One model per document type.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(
        &self,
        kind: DocumentType,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn model(&self, kind: DocumentType) -> EmbeddingModel;

    async fn embed_one(&self, kind: DocumentType, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(kind, &[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                expected: 1,
                got: vectors.len(),
            });
        }
        Ok(vectors.remove(0))
    }
}
