use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{EmbeddingUpdate, StoreError};

/// Rows a batch of finished embeddings belongs to.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EmbeddingTarget {
    Messages { session_id: String },
    Summaries { session_id: String },
    Documents { collection: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingUpdateBatch {
    pub target: EmbeddingTarget,
    pub updates: Vec<EmbeddingUpdate>,
}

/// Applies finished embeddings as ordinary writes.
#[async_trait]
pub trait EmbeddingSink: Send + Sync {
    /// Returns how many rows took the update; rows gone since the task was
    /// published are not counted.
    async fn apply(&self, batch: &EmbeddingUpdateBatch) -> Result<usize, StoreError>;
}

#[derive(Debug)]
pub struct EmbeddingUpdateOutcome {
    pub target: EmbeddingTarget,
    /// Rows written, as reported by the sink.
    pub applied: usize,
    pub result: Result<(), StoreError>,
}

/// Handle to the background consumer started by [`spawn_embedding_listener`].
pub struct EmbeddingListener {
    pub outcomes: mpsc::Receiver<EmbeddingUpdateOutcome>,
    handle: JoinHandle<()>,
}

impl EmbeddingListener {
    /// Waits for the consumer to finish draining.
    pub async fn join(self) -> Result<(), StoreError> {
        self.handle
            .await
            .map_err(|error| StoreError::storage("embedding listener", error))
    }

    pub fn split(self) -> (mpsc::Receiver<EmbeddingUpdateOutcome>, JoinHandle<()>) {
        (self.outcomes, self.handle)
    }
}

/// Starts the single consumer for embedding results.
///
/// Runs until `cancel` fires or every sender of `updates` is dropped. On
/// cancellation it stops accepting, applies the batches already queued, then
/// closes the outcome channel. Outcomes are reported with `try_send`; when the
/// outcome buffer is full the outcome is logged and dropped so a slow reader
/// never stalls the writes.
pub fn spawn_embedding_listener<S>(
    sink: Arc<S>,
    mut updates: mpsc::Receiver<EmbeddingUpdateBatch>,
    cancel: CancellationToken,
    outcome_buffer: usize,
) -> EmbeddingListener
where
    S: EmbeddingSink + ?Sized + 'static,
{
    let (outcome_tx, outcome_rx) = mpsc::channel(outcome_buffer.max(1));

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("embedding listener cancelled; draining queued batches");
                    break;
                }
                batch = updates.recv() => match batch {
                    Some(batch) => apply_batch(sink.as_ref(), batch, &outcome_tx).await,
                    None => {
                        tracing::debug!("embedding update channel closed; listener exiting");
                        return;
                    }
                },
            }
        }

        updates.close();
        while let Some(batch) = updates.recv().await {
            apply_batch(sink.as_ref(), batch, &outcome_tx).await;
        }
    });

    EmbeddingListener {
        outcomes: outcome_rx,
        handle,
    }
}

async fn apply_batch<S>(
    sink: &S,
    batch: EmbeddingUpdateBatch,
    outcomes: &mpsc::Sender<EmbeddingUpdateOutcome>,
) where
    S: EmbeddingSink + ?Sized,
{
    let (applied, result) = match sink.apply(&batch).await {
        Ok(applied) => (applied, Ok(())),
        Err(error) => {
            tracing::warn!(embedding_target = ?batch.target, error = %error, "failed to apply embedding batch");
            (0, Err(error))
        }
    };

    let outcome = EmbeddingUpdateOutcome {
        applied,
        target: batch.target,
        result,
    };
    if let Err(mpsc::error::TrySendError::Full(outcome)) = outcomes.try_send(outcome) {
        tracing::warn!(embedding_target = ?outcome.target, "embedding outcome buffer full; outcome dropped");
    }
}
