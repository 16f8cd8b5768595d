use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{StoreError, Value};

pub const MESSAGE_EMBEDDER_TOPIC: &str = "message_embedder";
pub const SUMMARY_EMBEDDER_TOPIC: &str = "summary_embedder";
pub const DOCUMENT_EMBEDDER_TOPIC: &str = "document_embedder";

/// Hands work to an out-of-band queue. Completion is not awaited.
#[async_trait]
pub trait TaskPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        routing: &HashMap<String, String>,
        payload: Value,
    ) -> Result<(), StoreError>;
}

/// One row awaiting an embedding.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingTask {
    pub uuid: Uuid,
    pub content: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub chunks_sent: usize,
    pub chunks_failed: usize,
    pub tasks_sent: usize,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.chunks_failed == 0
    }
}

/// Publishes `tasks` in chunks of `chunk_size`.
///
/// A failing chunk is logged and counted; the remaining chunks are still sent.
pub async fn publish_chunked<P>(
    publisher: &P,
    topic: &str,
    routing: &HashMap<String, String>,
    tasks: &[EmbeddingTask],
    chunk_size: usize,
) -> PublishReport
where
    P: TaskPublisher + ?Sized,
{
    let mut report = PublishReport::default();
    if tasks.is_empty() {
        return report;
    }

    let chunk_size = chunk_size.max(1);
    let total_chunks = tasks.len().div_ceil(chunk_size);
    for (chunk_index, chunk) in tasks.chunks(chunk_size).enumerate() {
        let payload = match serde_json::to_value(chunk) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(topic, chunk_index, error = %error, "failed to encode task chunk");
                report.chunks_failed += 1;
                continue;
            }
        };

        match publisher.publish(topic, routing, payload).await {
            Ok(()) => {
                report.chunks_sent += 1;
                report.tasks_sent += chunk.len();
            }
            Err(error) => {
                tracing::warn!(
                    topic,
                    chunk_index = chunk_index + 1,
                    total_chunks,
                    batch_size = chunk.len(),
                    error = %error,
                    "failed to publish embedding task chunk"
                );
                report.chunks_failed += 1;
            }
        }
    }

    report
}
