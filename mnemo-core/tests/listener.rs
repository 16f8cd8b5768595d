use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mnemo_core::listener::spawn_embedding_listener;
use mnemo_core::{
    EmbeddingSink, EmbeddingTarget, EmbeddingUpdate, EmbeddingUpdateBatch, StoreError,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Default)]
struct RecordingSink {
    applied: Mutex<Vec<EmbeddingUpdateBatch>>,
    reject_collection: Option<String>,
    /// Rows per batch that no longer exist in storage.
    stale_rows: usize,
}

#[async_trait]
impl EmbeddingSink for RecordingSink {
    async fn apply(&self, batch: &EmbeddingUpdateBatch) -> Result<usize, StoreError> {
        if let EmbeddingTarget::Documents { collection } = &batch.target {
            if Some(collection) == self.reject_collection.as_ref() {
                return Err(StoreError::not_found("collection", collection));
            }
        }
        self.applied.lock().unwrap().push(batch.clone());
        Ok(batch.updates.len().saturating_sub(self.stale_rows))
    }
}

fn batch(collection: &str, size: usize) -> EmbeddingUpdateBatch {
    EmbeddingUpdateBatch {
        target: EmbeddingTarget::Documents {
            collection: collection.to_string(),
        },
        updates: (0..size)
            .map(|_| EmbeddingUpdate {
                uuid: Uuid::new_v4(),
                embedding: vec![0.1, 0.2],
            })
            .collect(),
    }
}

#[tokio::test]
async fn applies_batches_and_reports_outcomes() {
    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = mpsc::channel(8);
    let mut listener = spawn_embedding_listener(sink.clone(), rx, CancellationToken::new(), 8);

    tx.send(batch("books", 3)).await.unwrap();
    let outcome = listener.outcomes.recv().await.unwrap();
    assert_eq!(outcome.applied, 3);
    assert!(outcome.result.is_ok());

    drop(tx);
    assert!(listener.outcomes.recv().await.is_none());
    listener.join().await.unwrap();
    assert_eq!(sink.applied.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_batch_is_reported_and_listener_keeps_running() {
    let sink = Arc::new(RecordingSink {
        reject_collection: Some("gone".to_string()),
        ..RecordingSink::default()
    });
    let (tx, rx) = mpsc::channel(8);
    let mut listener = spawn_embedding_listener(sink.clone(), rx, CancellationToken::new(), 8);

    tx.send(batch("gone", 2)).await.unwrap();
    tx.send(batch("books", 1)).await.unwrap();

    let first = listener.outcomes.recv().await.unwrap();
    assert_eq!(first.applied, 0);
    assert!(first.result.unwrap_err().is_not_found());
    let second = listener.outcomes.recv().await.unwrap();
    assert_eq!(second.applied, 1);
}

#[tokio::test]
async fn outcome_counts_only_rows_the_sink_wrote() {
    let sink = Arc::new(RecordingSink {
        stale_rows: 2,
        ..RecordingSink::default()
    });
    let (tx, rx) = mpsc::channel(8);
    let mut listener = spawn_embedding_listener(sink, rx, CancellationToken::new(), 8);

    tx.send(batch("books", 5)).await.unwrap();
    let outcome = listener.outcomes.recv().await.unwrap();
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.applied, 3);
}

#[tokio::test]
async fn cancellation_drains_queued_batches_then_closes_outcomes() {
    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();

    for _ in 0..3 {
        tx.send(batch("books", 1)).await.unwrap();
    }
    cancel.cancel();
    let listener = spawn_embedding_listener(sink.clone(), rx, cancel, 8);
    let (mut outcomes, handle) = listener.split();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("listener exits after cancellation")
        .unwrap();

    let mut received = 0;
    while let Some(outcome) = outcomes.recv().await {
        assert!(outcome.result.is_ok());
        received += 1;
    }
    assert_eq!(received, 3);
    assert_eq!(sink.applied.lock().unwrap().len(), 3);
    assert!(tx.send(batch("books", 1)).await.is_err());
}
