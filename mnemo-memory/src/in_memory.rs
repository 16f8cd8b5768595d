use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use mnemo_core::{
    check_dimensions, DocumentType, Embedder, EmbeddingError, MemoryConfig, Message, NewMessage,
    NewSummary, SearchQuery, SearchResult, StoreError, Summary,
};
use mnemo_retrieval::{InMemorySearchBackend, IndexedRow, SearchEngine};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::MemoryStore;

struct StoredMessage {
    message: Message,
    embedding: Option<Vec<f32>>,
    deleted: bool,
}

struct StoredSummary {
    summary: Summary,
    embedding: Option<Vec<f32>>,
}

#[derive(Default)]
struct SessionLog {
    messages: Vec<StoredMessage>,
    summaries: Vec<StoredSummary>,
}

/// Process-local session history, embedded inline on write.
///
/// Vec order is the message sequence. Useful for tests and for applications
/// that do not need a database.
#[derive(Clone)]
pub struct InMemoryStore {
    sessions: Arc<RwLock<HashMap<String, SessionLog>>>,
    search: SearchEngine,
}

impl InMemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_config(embedder, MemoryConfig::default())
    }

    pub fn with_config(embedder: Arc<dyn Embedder>, config: MemoryConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            search: SearchEngine::new(embedder, config),
        }
    }

    /// Appends messages in order, creating the session when absent.
    pub async fn put_messages(
        &self,
        session_id: &str,
        messages: Vec<NewMessage>,
    ) -> Result<Vec<Message>, StoreError> {
        require_session(session_id)?;
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = messages.iter().map(|m| m.content.clone()).collect();
        let embeddings = self.embed(DocumentType::Message, &texts).await?;

        let now = Utc::now();
        let stored: Vec<Message> = messages
            .into_iter()
            .map(|message| Message {
                uuid: message.uuid.unwrap_or_else(Uuid::new_v4),
                created_at: now,
                role: message.role,
                content: message.content,
                token_count: message.token_count,
                metadata: message.metadata,
            })
            .collect();

        let mut sessions = self.sessions.write().await;
        let log = sessions.entry(session_id.to_string()).or_default();
        for message in &stored {
            if log.messages.iter().any(|row| row.message.uuid == message.uuid) {
                return Err(StoreError::Conflict(format!(
                    "message {} already exists",
                    message.uuid
                )));
            }
        }
        for (message, embedding) in stored.iter().cloned().zip(embeddings) {
            log.messages.push(StoredMessage {
                message,
                embedding: Some(embedding),
                deleted: false,
            });
        }
        Ok(stored)
    }

    /// Records a summary whose checkpoint must be a live message of the session.
    pub async fn put_summary(
        &self,
        session_id: &str,
        summary: NewSummary,
    ) -> Result<Summary, StoreError> {
        require_session(session_id)?;
        let embedding = self
            .embed(DocumentType::Summary, &[summary.content.clone()])
            .await?
            .pop();

        let mut sessions = self.sessions.write().await;
        let log = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::not_found("session", session_id))?;
        let checkpoint_exists = log
            .messages
            .iter()
            .any(|row| !row.deleted && row.message.uuid == summary.summary_point_uuid);
        if !checkpoint_exists {
            return Err(StoreError::not_found("message", summary.summary_point_uuid));
        }

        let stored = Summary {
            uuid: Uuid::new_v4(),
            created_at: Utc::now(),
            content: summary.content,
            summary_point_uuid: summary.summary_point_uuid,
            token_count: summary.token_count,
            metadata: summary.metadata,
        };
        log.summaries.push(StoredSummary {
            summary: stored.clone(),
            embedding,
        });
        Ok(stored)
    }

    /// Soft-deletes messages; a deleted checkpoint no longer resolves.
    pub async fn delete_messages(&self, session_id: &str, uuids: &[Uuid]) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let log = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::not_found("session", session_id))?;
        for uuid in uuids {
            let row = log
                .messages
                .iter_mut()
                .find(|row| !row.deleted && row.message.uuid == *uuid)
                .ok_or_else(|| StoreError::not_found("message", uuid))?;
            row.deleted = true;
        }
        Ok(())
    }

    pub async fn search_messages(
        &self,
        session_id: &str,
        query: &SearchQuery,
        limit: usize,
    ) -> Result<Vec<SearchResult<Message>>, StoreError> {
        let backend = InMemorySearchBackend::new(
            DocumentType::Message,
            self.dimensions(DocumentType::Message),
        );
        let rows: Vec<IndexedRow<Message>> = {
            let sessions = self.sessions.read().await;
            sessions
                .get(session_id)
                .map(|log| {
                    log.messages
                        .iter()
                        .filter(|row| !row.deleted)
                        .map(|row| IndexedRow {
                            item: row.message.clone(),
                            embedding: row.embedding.clone(),
                            metadata: row.message.metadata.clone(),
                            created_at: row.message.created_at,
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        for row in rows {
            backend.insert(row).await?;
        }
        self.search.search(&backend, query, limit).await
    }

    fn dimensions(&self, kind: DocumentType) -> usize {
        self.search.embedder().model(kind).dimensions
    }

    async fn embed(&self, kind: DocumentType, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        let embeddings = self.search.embedder().embed(kind, texts).await?;
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
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn latest_summary(&self, session_id: &str) -> Result<Option<Summary>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .and_then(|log| log.summaries.last())
            .map(|row| row.summary.clone()))
    }

    async fn last_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let sessions = self.sessions.read().await;
        let Some(log) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        let live: Vec<&Message> = log
            .messages
            .iter()
            .filter(|row| !row.deleted)
            .map(|row| &row.message)
            .collect();
        let start = live.len().saturating_sub(limit);
        Ok(live[start..].iter().map(|message| (*message).clone()).collect())
    }

    async fn messages_since(
        &self,
        session_id: &str,
        checkpoint: Uuid,
        limit: usize,
    ) -> Result<Option<Vec<Message>>, StoreError> {
        let sessions = self.sessions.read().await;
        let Some(log) = sessions.get(session_id) else {
            return Ok(None);
        };
        let live: Vec<&Message> = log
            .messages
            .iter()
            .filter(|row| !row.deleted)
            .map(|row| &row.message)
            .collect();
        let Some(position) = live.iter().position(|message| message.uuid == checkpoint) else {
            return Ok(None);
        };
        let after = &live[position + 1..];
        let start = after.len().saturating_sub(limit);
        Ok(Some(
            after[start..]
                .iter()
                .map(|message| (*message).clone())
                .collect(),
        ))
    }

    async fn search_summaries(
        &self,
        session_id: &str,
        query: &SearchQuery,
        limit: usize,
    ) -> Result<Vec<SearchResult<Summary>>, StoreError> {
        let backend = InMemorySearchBackend::new(
            DocumentType::Summary,
            self.dimensions(DocumentType::Summary),
        );
        let rows: Vec<IndexedRow<Summary>> = {
            let sessions = self.sessions.read().await;
            sessions
                .get(session_id)
                .map(|log| {
                    log.summaries
                        .iter()
                        .map(|row| IndexedRow {
                            item: row.summary.clone(),
                            embedding: row.embedding.clone(),
                            metadata: row.summary.metadata.clone(),
                            created_at: row.summary.created_at,
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        for row in rows {
            backend.insert(row).await?;
        }
        self.search.search(&backend, query, limit).await
    }
}

fn require_session(session_id: &str) -> Result<(), StoreError> {
    if session_id.trim().is_empty() {
        return Err(StoreError::invalid("session_id must not be empty"));
    }
    Ok(())
}
