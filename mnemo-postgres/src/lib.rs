//! Postgres/pgvector storage for mnemo.
//!
//! [`PostgresMemoryStore`] owns a connection pool and implements every storage
//! operation: sessions, messages, summaries, document collections and their
//! per-collection tables, search over all three scopes, and the embedding
//! hand-off sink. The window engine runs against it through
//! [`mnemo_memory::MemoryStore`].

use std::sync::Arc;

use mnemo_core::{
    DocumentType, Embedder, MemoryConfig, MetadataMerger, StoreError, TaskPublisher,
};
use mnemo_memory::MemoryWindow;
use mnemo_retrieval::SearchEngine;
use mnemo_sql::migrations::run_migrations;
use mnemo_sql::schema::SchemaDimensions;
use mnemo_sql::SqlError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod collections;
mod documents;
mod locks;
mod memory;
mod messages;
mod publish;
mod search;
mod sessions;
mod sink;
mod summaries;

pub use locks::{PgLockGuard, PgLockManager, PgMetadataRepository};
pub use search::PgSearchBackend;

const MIN_DEFAULT_CONNECTIONS: u32 = 4;

#[derive(Clone)]
pub struct PostgresMemoryStore {
    pool: PgPool,
    search: SearchEngine,
    publisher: Option<Arc<dyn TaskPublisher>>,
    merger: Arc<MetadataMerger<PgLockManager, PgMetadataRepository>>,
}

pub struct PostgresMemoryStoreBuilder {
    database_url: String,
    max_connections: Option<u32>,
    min_connections: u32,
    config: MemoryConfig,
    embedder: Option<Arc<dyn Embedder>>,
    publisher: Option<Arc<dyn TaskPublisher>>,
}

impl PostgresMemoryStore {
    pub fn builder(database_url: impl Into<String>) -> PostgresMemoryStoreBuilder {
        PostgresMemoryStoreBuilder {
            database_url: database_url.into(),
            max_connections: None,
            min_connections: 0,
            config: MemoryConfig::default(),
            embedder: None,
            publisher: None,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &MemoryConfig {
        self.search.config()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        self.search.embedder()
    }

    /// Window engine reading from this store.
    pub fn memory_window(&self) -> MemoryWindow<PostgresMemoryStore> {
        MemoryWindow::new(Arc::new(self.clone())).with_config(self.config().clone())
    }

    pub(crate) fn dimensions(&self, kind: DocumentType) -> usize {
        self.embedder().model(kind).dimensions
    }
}

/// `available_parallelism() * 4`, the pool size used when none is configured.
pub fn default_max_connections() -> u32 {
    std::thread::available_parallelism()
        .map(|parallelism| u32::try_from(parallelism.get()).unwrap_or(u32::MAX).saturating_mul(4))
        .unwrap_or(MIN_DEFAULT_CONNECTIONS)
}

impl PostgresMemoryStoreBuilder {
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    pub fn min_connections(mut self, min_connections: u32) -> Self {
        self.min_connections = min_connections;
        self
    }

    pub fn config(mut self, config: MemoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Embedding tasks go to `publisher`; without one, writes embed inline.
    pub fn publisher(mut self, publisher: Arc<dyn TaskPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Connects, applies the idempotent schema and reconciles embedding widths.
    pub async fn build(self) -> Result<PostgresMemoryStore, StoreError> {
        let embedder = self
            .embedder
            .ok_or_else(|| StoreError::invalid("an embedder is required"))?;
        self.config.validate()?;

        let max_connections = self.max_connections.unwrap_or_else(default_max_connections);
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(self.min_connections)
            .connect(&self.database_url)
            .await
            .map_err(SqlError::Connection)?;
        // lock waiters park a connection inside pg_advisory_lock; keep them off the work pool
        let lock_pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy_with((*pool.connect_options()).clone());

        let dimensions = SchemaDimensions {
            message: embedder.model(DocumentType::Message).dimensions,
            summary: embedder.model(DocumentType::Summary).dimensions,
        };
        run_migrations(&pool, dimensions).await?;

        let store = PostgresMemoryStore::from_parts(
            pool,
            lock_pool,
            embedder,
            self.config,
            self.publisher,
        );
        store.ensure_embedding_width().await?;
        Ok(store)
    }
}

impl PostgresMemoryStore {
    fn from_parts(
        pool: PgPool,
        lock_pool: PgPool,
        embedder: Arc<dyn Embedder>,
        config: MemoryConfig,
        publisher: Option<Arc<dyn TaskPublisher>>,
    ) -> Self {
        let merger = MetadataMerger::new(
            PgLockManager::new(lock_pool),
            PgMetadataRepository::new(pool.clone()),
        );
        Self {
            pool,
            search: SearchEngine::new(embedder, config),
            publisher,
            merger: Arc::new(merger),
        }
    }
}
