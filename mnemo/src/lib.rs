//! Long-term memory for conversational AI.
//!
//! Chat sessions with rolling summaries, windowed memory retrieval, vector
//! search with MMR reranking and document collections. The in-memory store
//! needs nothing else; the `postgres` feature (on by default) adds the
//! Postgres/pgvector backend.

pub use mnemo_core as core;
pub use mnemo_memory as memory;
pub use mnemo_retrieval as retrieval;

#[cfg(feature = "postgres")]
pub use mnemo_postgres as postgres;
#[cfg(feature = "postgres")]
pub use mnemo_sql as sql;

pub use mnemo_core::{
    CreateCollectionRequest, CreateDocumentRequest, CreateSessionRequest, Document,
    DocumentCollection, DocumentSelection, DocumentType, Embedder, EmbeddingModel, Memory,
    MemoryConfig, Message, Metadata, MetadataFilter, NewMessage, NewSummary, SearchQuery,
    SearchResult, SearchType, Session, StoreError, Summary, TaskPublisher,
    UpdateCollectionRequest, UpdateDocumentRequest, UpdateSessionRequest,
};
pub use mnemo_memory::{InMemoryStore, MemoryStore, MemoryWindow, PerpetualOptions};
pub use mnemo_retrieval::{HashEmbedder, SearchEngine};

#[cfg(feature = "postgres")]
pub use mnemo_postgres::{PostgresMemoryStore, PostgresMemoryStoreBuilder};
