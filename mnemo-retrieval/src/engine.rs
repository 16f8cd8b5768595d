use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mnemo_core::{
    check_dimensions, DocumentType, Embedder, MemoryConfig, MetadataFilter, SearchQuery,
    SearchResult, SearchType, StoreError,
};

use crate::mmr;

/// What a backend is asked to fetch for one search.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchPlan {
    pub query_embedding: Option<Vec<f32>>,
    pub metadata: Option<MetadataFilter>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub min_score: Option<f32>,
    pub limit: usize,
    /// Candidates must carry their stored embedding (needed for MMR).
    pub with_embeddings: bool,
}

/// A row returned by a backend, before reranking.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate<T> {
    pub item: T,
    /// Cosine similarity to the query; `None` when no query vector was given.
    pub dist: Option<f32>,
    pub embedding: Option<Vec<f32>>,
}

/// One searchable scope (a session's messages or summaries, a collection's documents).
///
/// Backends exclude deleted rows, apply the plan's filters and date bounds,
/// and order by similarity descending when a query vector is present.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    type Item: Send;

    fn document_type(&self) -> DocumentType;

    /// Width of the scope's embedding column.
    fn dimensions(&self) -> usize;

    async fn candidates(&self, plan: &SearchPlan) -> Result<Vec<Candidate<Self::Item>>, StoreError>;
}

#[derive(Clone)]
pub struct SearchEngine {
    embedder: Arc<dyn Embedder>,
    config: MemoryConfig,
}

impl SearchEngine {
    pub fn new(embedder: Arc<dyn Embedder>, config: MemoryConfig) -> Self {
        Self { embedder, config }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub async fn search<B>(
        &self,
        backend: &B,
        query: &SearchQuery,
        limit: usize,
    ) -> Result<Vec<SearchResult<B::Item>>, StoreError>
    where
        B: SearchBackend + ?Sized,
    {
        query.validate()?;
        if limit == 0 {
            return Err(StoreError::invalid("search limit must be greater than 0"));
        }

        let query_embedding = self.query_embedding(backend, query).await?;
        let use_mmr = query.search_type == SearchType::Mmr && query_embedding.is_some();
        let fetch_limit = if use_mmr {
            self.config.mmr_candidate_limit(limit)
        } else {
            limit
        };

        let plan = SearchPlan {
            query_embedding,
            metadata: query.metadata.clone(),
            start_date: query.start_date,
            end_date: query.end_date,
            min_score: query.min_score,
            limit: fetch_limit,
            with_embeddings: use_mmr,
        };

        let filtered = query.metadata.is_some();
        let mut candidates: Vec<Candidate<B::Item>> = backend
            .candidates(&plan)
            .await?
            .into_iter()
            .filter(|candidate| filtered || candidate.dist.is_some_and(|dist| !dist.is_nan()))
            .collect();

        tracing::debug!(
            document_type = backend.document_type().as_str(),
            candidates = candidates.len(),
            limit,
            mmr = use_mmr,
            "search candidates fetched"
        );

        if use_mmr {
            let lambda = query.mmr_lambda.unwrap_or(self.config.mmr_lambda);
            let query_vector = plan.query_embedding.as_deref().unwrap_or_default();
            candidates = select_mmr(query_vector, candidates, lambda, limit);
        } else {
            candidates.truncate(limit);
        }

        Ok(candidates
            .into_iter()
            .map(|candidate| SearchResult {
                item: candidate.item,
                dist: candidate.dist.unwrap_or(f32::NAN),
            })
            .collect())
    }

    async fn query_embedding<B>(
        &self,
        backend: &B,
        query: &SearchQuery,
    ) -> Result<Option<Vec<f32>>, StoreError>
    where
        B: SearchBackend + ?Sized,
    {
        let expected = backend.dimensions();
        if let Some(text) = query.text.as_deref().filter(|text| !text.trim().is_empty()) {
            let embedding = self
                .embedder
                .embed_one(backend.document_type(), text)
                .await?;
            check_dimensions(expected, &embedding)?;
            return Ok(Some(embedding));
        }
        match query.embedding.as_ref().filter(|vector| !vector.is_empty()) {
            Some(embedding) => {
                check_dimensions(expected, embedding)?;
                Ok(Some(embedding.clone()))
            }
            None => Ok(None),
        }
    }
}

fn select_mmr<T>(
    query: &[f32],
    candidates: Vec<Candidate<T>>,
    lambda: f32,
    limit: usize,
) -> Vec<Candidate<T>> {
    let vectors: Vec<Vec<f32>> = candidates
        .iter()
        .map(|candidate| candidate.embedding.clone().unwrap_or_default())
        .collect();
    let order = mmr::rerank(query, &vectors, lambda, limit);

    let mut slots: Vec<Option<Candidate<T>>> = candidates.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|index| slots.get_mut(index).and_then(Option::take))
        .collect()
}
