use std::collections::HashMap;

use mnemo_core::{
    check_dimensions, publish_chunked, DocumentType, EmbeddingError, EmbeddingTask, StoreError,
};

use crate::PostgresMemoryStore;

impl PostgresMemoryStore {
    /// Writes embed synchronously when no task publisher is configured.
    pub(crate) fn embeds_inline(&self) -> bool {
        self.publisher.is_none()
    }

    pub(crate) async fn embed_inline(
        &self,
        kind: DocumentType,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, StoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self.embedder().embed(kind, texts).await?;
        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                got: embeddings.len(),
            }
            .into());
        }
        let expected = self.dimensions(kind);
        for embedding in &embeddings {
            check_dimensions(expected, embedding)?;
        }
        Ok(embeddings)
    }

    /// Best-effort hand-off of committed rows to the embedder topic.
    pub(crate) async fn publish_tasks(
        &self,
        topic: &str,
        routing: HashMap<String, String>,
        tasks: Vec<EmbeddingTask>,
    ) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let report = publish_chunked(
            publisher.as_ref(),
            topic,
            &routing,
            &tasks,
            self.config().task_chunk_size,
        )
        .await;
        if !report.is_complete() {
            tracing::warn!(
                topic,
                chunks_failed = report.chunks_failed,
                tasks_sent = report.tasks_sent,
                tasks_total = tasks.len(),
                "embedding tasks partially published"
            );
        }
    }
}

pub(crate) fn routing(key: &str, value: &str) -> HashMap<String, String> {
    HashMap::from([(key.to_string(), value.to_string())])
}
