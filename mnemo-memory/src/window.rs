use std::sync::Arc;

use mnemo_core::{
    Memory, MemoryConfig, Message, SearchQuery, SearchResult, SearchType, StoreError, Summary,
};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::MemoryStore;

pub const DEFAULT_MAX_RELEVANT_SUMMARIES: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerpetualOptions {
    /// Recent messages returned and used as the relevance query.
    pub last_n: i64,
    pub use_mmr: bool,
    pub max_summaries: usize,
    pub include_latest_summary: bool,
}

impl PerpetualOptions {
    pub fn new(last_n: i64) -> Self {
        Self {
            last_n,
            use_mmr: false,
            max_summaries: DEFAULT_MAX_RELEVANT_SUMMARIES,
            include_latest_summary: true,
        }
    }

    pub fn with_mmr(mut self, use_mmr: bool) -> Self {
        self.use_mmr = use_mmr;
        self
    }

    pub fn with_max_summaries(mut self, max_summaries: usize) -> Self {
        self.max_summaries = max_summaries;
        self
    }

    pub fn with_latest_summary(mut self, include: bool) -> Self {
        self.include_latest_summary = include;
        self
    }
}

/// Rebuilds the bounded context a caller should remember for a session.
pub struct MemoryWindow<S: ?Sized> {
    store: Arc<S>,
    config: MemoryConfig,
}

impl<S: ?Sized> Clone for MemoryWindow<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S> MemoryWindow<S>
where
    S: MemoryStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            config: MemoryConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MemoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// `last_n > 0`: the last `last_n` messages. `last_n == 0`: messages after
    /// the latest summary's checkpoint (or the most recent ones when there is
    /// no usable checkpoint), capped at the configured window size. The latest
    /// summary is attached either way.
    pub async fn get_window(&self, session_id: &str, last_n: i64) -> Result<Memory, StoreError> {
        require_session(session_id)?;
        if last_n < 0 {
            return Err(StoreError::invalid(format!(
                "last_n must not be negative, got {last_n}"
            )));
        }

        let span = tracing::info_span!("memory_get_window", session_id = %session_id, last_n);
        self.load_window(session_id, last_n).instrument(span).await
    }

    /// Recent messages plus the historical summaries most relevant to them.
    ///
    /// Both lookups run concurrently; either failing fails the call.
    pub async fn get_perpetual_window(
        &self,
        session_id: &str,
        options: &PerpetualOptions,
    ) -> Result<Memory, StoreError> {
        require_session(session_id)?;
        if options.last_n < 1 {
            return Err(StoreError::invalid(format!(
                "last_n must be at least 1, got {}",
                options.last_n
            )));
        }

        let span = tracing::info_span!(
            "memory_get_perpetual_window",
            session_id = %session_id,
            last_n = options.last_n,
            use_mmr = options.use_mmr,
            max_summaries = options.max_summaries,
        );
        let (summary, (messages, relevant_summaries)) = async {
            tokio::try_join!(
                self.latest_summary_if(session_id, options.include_latest_summary),
                self.recent_with_relevant_summaries(session_id, options),
            )
        }
        .instrument(span)
        .await?;

        Ok(Memory {
            messages,
            summary,
            relevant_summaries,
        })
    }

    async fn load_window(&self, session_id: &str, last_n: i64) -> Result<Memory, StoreError> {
        let summary = self.store.latest_summary(session_id).await?;
        let window_size = self.config.window_size;

        let messages = if last_n > 0 {
            self.store
                .last_messages(session_id, clamp_count(last_n))
                .await?
        } else if let Some(summary) = &summary {
            match self
                .store
                .messages_since(session_id, summary.summary_point_uuid, window_size)
                .await?
            {
                Some(messages) => messages,
                None => {
                    tracing::warn!(
                        session_id = %session_id,
                        summary_point_uuid = %summary.summary_point_uuid,
                        "summary checkpoint not resolvable, falling back to recent messages"
                    );
                    self.store.last_messages(session_id, window_size).await?
                }
            }
        } else {
            self.store.last_messages(session_id, window_size).await?
        };

        Ok(Memory {
            messages,
            summary,
            relevant_summaries: Vec::new(),
        })
    }

    async fn latest_summary_if(
        &self,
        session_id: &str,
        include: bool,
    ) -> Result<Option<Summary>, StoreError> {
        if !include {
            return Ok(None);
        }
        self.store.latest_summary(session_id).await
    }

    /// The last `last_n` messages, and the summaries closest to their joined text.
    async fn recent_with_relevant_summaries(
        &self,
        session_id: &str,
        options: &PerpetualOptions,
    ) -> Result<(Vec<Message>, Vec<SearchResult<Summary>>), StoreError> {
        let messages = self
            .store
            .last_messages(session_id, clamp_count(options.last_n))
            .await?;
        let query_text = messages
            .iter()
            .map(|message| message.content.trim())
            .filter(|content| !content.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if query_text.is_empty() || options.max_summaries == 0 {
            return Ok((messages, Vec::new()));
        }

        let search_type = if options.use_mmr {
            SearchType::Mmr
        } else {
            SearchType::Similarity
        };
        let query = SearchQuery::text(query_text)
            .with_min_score(self.config.perpetual_min_score)
            .with_search_type(search_type);
        let summaries = self
            .store
            .search_summaries(session_id, &query, options.max_summaries)
            .await?;
        Ok((messages, summaries))
    }
}

fn require_session(session_id: &str) -> Result<(), StoreError> {
    if session_id.trim().is_empty() {
        return Err(StoreError::invalid("session_id must not be empty"));
    }
    Ok(())
}

fn clamp_count(count: i64) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX)
}
