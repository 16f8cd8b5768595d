use async_trait::async_trait;
use mnemo_core::{DocumentType, EmbeddingSink, EmbeddingTarget, EmbeddingUpdateBatch, StoreError};
use mnemo_sql::schema::SUMMARY_EMBEDDING_TABLE;

use crate::PostgresMemoryStore;

/// Lets the embedding listener write finished vectors straight into the store.
#[async_trait]
impl EmbeddingSink for PostgresMemoryStore {
    async fn apply(&self, batch: &EmbeddingUpdateBatch) -> Result<usize, StoreError> {
        match &batch.target {
            EmbeddingTarget::Messages { session_id } => {
                self.put_message_embeddings(session_id, &batch.updates).await
            }
            EmbeddingTarget::Summaries { session_id } => {
                self.apply_session_embeddings(
                    SUMMARY_EMBEDDING_TABLE,
                    "summary_uuid",
                    DocumentType::Summary,
                    session_id,
                    &batch.updates,
                )
                .await
            }
            EmbeddingTarget::Documents { collection } => {
                self.update_document_embeddings(collection, &batch.updates)
                    .await
            }
        }
    }
}
