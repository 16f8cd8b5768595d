use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MetadataFilter, StoreError};

/// Which kind of row a vector belongs to; selects the embedding model.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Message,
    Summary,
    Document,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Message => "message",
            DocumentType::Summary => "summary",
            DocumentType::Document => "document",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Similarity,
    Mmr,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Option<MetadataFilter>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub search_type: SearchType,
    /// Relevance/diversity trade-off for MMR; the configured default when unset.
    pub mmr_lambda: Option<f32>,
    /// Lower bound on `dist` for similarity-ordered queries.
    pub min_score: Option<f32>,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn embedding(embedding: Vec<f32>) -> Self {
        Self {
            embedding: Some(embedding),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, filter: MetadataFilter) -> Self {
        self.metadata = Some(filter);
        self
    }

    pub fn with_search_type(mut self, search_type: SearchType) -> Self {
        self.search_type = search_type;
        self
    }

    pub fn with_mmr_lambda(mut self, lambda: f32) -> Self {
        self.mmr_lambda = Some(lambda);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_date_range(
        mut self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_date = start_date;
        self.end_date = end_date;
        self
    }

    fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|text| !text.trim().is_empty())
    }

    fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|vector| !vector.is_empty())
    }

    /// Boundary checks done before any I/O.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.has_text() && self.has_embedding() {
            return Err(StoreError::invalid(
                "query text and query embedding are mutually exclusive",
            ));
        }
        if !self.has_text() && !self.has_embedding() && self.metadata.is_none() {
            return Err(StoreError::invalid("empty query"));
        }
        if let Some(filter) = &self.metadata {
            filter.validate()?;
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(StoreError::invalid("start_date must not be after end_date"));
            }
        }
        if let Some(lambda) = self.mmr_lambda {
            if !(0.0..=1.0).contains(&lambda) {
                return Err(StoreError::invalid(format!(
                    "mmr_lambda must be within [0, 1], got {lambda}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SearchResult<T> {
    pub item: T,
    /// Cosine similarity to the query; `NaN` for metadata-only matches.
    pub dist: f32,
}

/// A finished embedding for a stored row.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingUpdate {
    pub uuid: uuid::Uuid,
    pub embedding: Vec<f32>,
}
