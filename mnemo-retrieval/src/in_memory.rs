use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mnemo_core::{check_dimensions, DocumentType, Metadata, StoreError};
use tokio::sync::RwLock;

use crate::engine::{Candidate, SearchBackend, SearchPlan};
use crate::filter;
use crate::similarity::cosine_score;

#[derive(Clone, Debug)]
pub struct IndexedRow<T> {
    pub item: T,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// Vec-backed search scope with the same filtering rules as the SQL backends.
#[derive(Clone)]
pub struct InMemorySearchBackend<T> {
    document_type: DocumentType,
    dimensions: usize,
    rows: Arc<RwLock<Vec<IndexedRow<T>>>>,
}

impl<T> InMemorySearchBackend<T> {
    pub fn new(document_type: DocumentType, dimensions: usize) -> Self {
        Self {
            document_type,
            dimensions,
            rows: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn insert(&self, row: IndexedRow<T>) -> Result<(), StoreError> {
        if let Some(embedding) = &row.embedding {
            check_dimensions(self.dimensions, embedding)?;
        }
        self.rows.write().await.push(row);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl<T> SearchBackend for InMemorySearchBackend<T>
where
    T: Clone + Send + Sync,
{
    type Item = T;

    fn document_type(&self) -> DocumentType {
        self.document_type
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn candidates(&self, plan: &SearchPlan) -> Result<Vec<Candidate<T>>, StoreError> {
        let rows = self.rows.read().await;
        let mut scored = Vec::new();
        for row in rows.iter() {
            if let Some(metadata_filter) = &plan.metadata {
                if !filter::matches(metadata_filter, &row.metadata) {
                    continue;
                }
            }
            if plan.start_date.is_some_and(|start| row.created_at < start)
                || plan.end_date.is_some_and(|end| row.created_at > end)
            {
                continue;
            }

            let dist = match (&plan.query_embedding, &row.embedding) {
                (Some(query), Some(embedding)) => Some(cosine_score(query, embedding)),
                (Some(_), None) => continue,
                (None, _) => None,
            };
            if let (Some(min_score), Some(dist)) = (plan.min_score, dist) {
                if dist < min_score {
                    continue;
                }
            }

            scored.push(Candidate {
                item: row.item.clone(),
                dist,
                embedding: if plan.with_embeddings {
                    row.embedding.clone()
                } else {
                    None
                },
            });
        }

        if plan.query_embedding.is_some() {
            scored.sort_by(|a, b| {
                sort_key(b.dist)
                    .partial_cmp(&sort_key(a.dist))
                    .unwrap_or(Ordering::Equal)
            });
        }
        scored.truncate(plan.limit);
        Ok(scored)
    }
}

fn sort_key(dist: Option<f32>) -> f32 {
    match dist {
        Some(dist) if !dist.is_nan() => dist,
        _ => f32::NEG_INFINITY,
    }
}
