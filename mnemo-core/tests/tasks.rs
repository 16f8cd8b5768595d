use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use mnemo_core::tasks::DOCUMENT_EMBEDDER_TOPIC;
use mnemo_core::{publish_chunked, EmbeddingTask, StoreError, TaskPublisher, Value};
use uuid::Uuid;

#[derive(Default)]
struct RecordingPublisher {
    fail_chunk: Option<usize>,
    calls: Mutex<Vec<Value>>,
}

#[async_trait]
impl TaskPublisher for RecordingPublisher {
    async fn publish(
        &self,
        topic: &str,
        _routing: &HashMap<String, String>,
        payload: Value,
    ) -> Result<(), StoreError> {
        assert_eq!(topic, DOCUMENT_EMBEDDER_TOPIC);
        let mut calls = self.calls.lock().unwrap();
        let index = calls.len();
        calls.push(payload);
        if self.fail_chunk == Some(index) {
            return Err(StoreError::Publish("broker unavailable".to_string()));
        }
        Ok(())
    }
}

fn tasks(count: usize) -> Vec<EmbeddingTask> {
    (0..count)
        .map(|index| EmbeddingTask {
            uuid: Uuid::new_v4(),
            content: format!("doc {index}"),
        })
        .collect()
}

#[tokio::test]
async fn publishes_every_chunk() {
    let publisher = RecordingPublisher::default();
    let report = publish_chunked(
        &publisher,
        DOCUMENT_EMBEDDER_TOPIC,
        &HashMap::new(),
        &tasks(25),
        10,
    )
    .await;

    assert!(report.is_complete());
    assert_eq!(report.chunks_sent, 3);
    assert_eq!(report.tasks_sent, 25);
    let calls = publisher.calls.lock().unwrap();
    assert_eq!(calls[2].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn failed_chunk_does_not_abort_siblings() {
    let publisher = RecordingPublisher {
        fail_chunk: Some(1),
        ..RecordingPublisher::default()
    };
    let report = publish_chunked(
        &publisher,
        DOCUMENT_EMBEDDER_TOPIC,
        &HashMap::new(),
        &tasks(30),
        10,
    )
    .await;

    assert_eq!(report.chunks_sent, 2);
    assert_eq!(report.chunks_failed, 1);
    assert_eq!(report.tasks_sent, 20);
    assert_eq!(publisher.calls.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn empty_task_list_publishes_nothing() {
    let publisher = RecordingPublisher::default();
    let report = publish_chunked(
        &publisher,
        DOCUMENT_EMBEDDER_TOPIC,
        &HashMap::new(),
        &[],
        10,
    )
    .await;
    assert_eq!(report.chunks_sent, 0);
    assert!(publisher.calls.lock().unwrap().is_empty());
}
