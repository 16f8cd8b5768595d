//! Core types and collaborator seams for the mnemo memory store.

mod collection;
pub mod config;
mod embedding;
mod error;
pub mod listener;
pub mod lock;
pub mod merge;
mod message;
mod metadata_filter;
mod search;
mod session;
pub mod tasks;
mod value;

pub use collection::{
    CreateCollectionRequest, CreateDocumentRequest, DistanceFunction, Document,
    DocumentCollection, DocumentSelection, IndexType, UpdateCollectionRequest,
    UpdateDocumentRequest,
};
pub use config::MemoryConfig;
pub use embedding::{Embedder, EmbeddingModel};
pub use error::{check_dimensions, EmbeddingError, StoreError};
pub use listener::{EmbeddingSink, EmbeddingTarget, EmbeddingUpdateBatch};
pub use lock::{lock_key, InMemoryLockManager, LockManager};
pub use merge::{deep_merge, MetadataMerger, MetadataRepository, MetadataTarget};
pub use message::{Memory, Message, MessagePage, NewMessage, NewSummary, Summary, SummaryPage};
pub use metadata_filter::{split_path_mode, JsonPathMode, MetadataFilter};
pub use search::{DocumentType, EmbeddingUpdate, SearchQuery, SearchResult, SearchType};
pub use session::{CreateSessionRequest, Session, SessionPage, UpdateSessionRequest};
pub use tasks::{publish_chunked, EmbeddingTask, PublishReport, TaskPublisher};
pub use value::{Metadata, Value};
