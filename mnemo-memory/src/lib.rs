use async_trait::async_trait;
use mnemo_core::{Message, SearchQuery, SearchResult, StoreError, Summary};
use uuid::Uuid;

pub mod in_memory;
mod in_memory_tests;
pub mod window;

pub use in_memory::InMemoryStore;
pub use window::{MemoryWindow, PerpetualOptions};

/// Session history as the window engine reads it.
///
/// Message lists are always ascending by store sequence and never include
/// soft-deleted rows.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Most recently created summary of the session.
    async fn latest_summary(&self, session_id: &str) -> Result<Option<Summary>, StoreError>;

    /// The last `limit` messages.
    async fn last_messages(&self, session_id: &str, limit: usize)
        -> Result<Vec<Message>, StoreError>;

    /// Messages strictly after `checkpoint`, keeping the most recent `limit`.
    ///
    /// `None` when the checkpoint message cannot be resolved in this session.
    async fn messages_since(
        &self,
        session_id: &str,
        checkpoint: Uuid,
        limit: usize,
    ) -> Result<Option<Vec<Message>>, StoreError>;

    async fn search_summaries(
        &self,
        session_id: &str,
        query: &SearchQuery,
        limit: usize,
    ) -> Result<Vec<SearchResult<Summary>>, StoreError>;
}
