use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::StoreError;

pub const DEFAULT_WINDOW_SIZE: usize = 12;
pub const DEFAULT_PERPETUAL_MIN_SCORE: f32 = 0.7;
pub const DEFAULT_MMR_LAMBDA: f32 = 0.5;
pub const DEFAULT_MMR_MULTIPLIER: usize = 2;
pub const DEFAULT_MMR_MIN_CANDIDATES: usize = 10;
pub const DEFAULT_TASK_CHUNK_SIZE: usize = 100;
pub const DEFAULT_LISTENER_BUFFER: usize = 64;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Upper bound on messages returned by a `last_n == 0` window.
    pub window_size: usize,
    /// Minimum similarity for summaries pulled into a perpetual window.
    pub perpetual_min_score: f32,
    pub mmr_lambda: f32,
    /// MMR candidate pool is `limit * mmr_multiplier`, at least `mmr_min_candidates`.
    pub mmr_multiplier: usize,
    pub mmr_min_candidates: usize,
    /// Tasks per published chunk for asynchronous embedding.
    pub task_chunk_size: usize,
    /// Capacity of the embedding listener's channels.
    pub listener_buffer: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            perpetual_min_score: DEFAULT_PERPETUAL_MIN_SCORE,
            mmr_lambda: DEFAULT_MMR_LAMBDA,
            mmr_multiplier: DEFAULT_MMR_MULTIPLIER,
            mmr_min_candidates: DEFAULT_MMR_MIN_CANDIDATES,
            task_chunk_size: DEFAULT_TASK_CHUNK_SIZE,
            listener_buffer: DEFAULT_LISTENER_BUFFER,
        }
    }
}

impl MemoryConfig {
    /// Defaults overlaid with `MNEMO_*` environment variables.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        overlay(&lookup, "MNEMO_WINDOW_SIZE", &mut config.window_size)?;
        overlay(
            &lookup,
            "MNEMO_PERPETUAL_MIN_SCORE",
            &mut config.perpetual_min_score,
        )?;
        overlay(&lookup, "MNEMO_MMR_LAMBDA", &mut config.mmr_lambda)?;
        overlay(&lookup, "MNEMO_MMR_MULTIPLIER", &mut config.mmr_multiplier)?;
        overlay(
            &lookup,
            "MNEMO_MMR_MIN_CANDIDATES",
            &mut config.mmr_min_candidates,
        )?;
        overlay(&lookup, "MNEMO_TASK_CHUNK_SIZE", &mut config.task_chunk_size)?;
        overlay(&lookup, "MNEMO_LISTENER_BUFFER", &mut config.listener_buffer)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.window_size == 0 {
            return Err(StoreError::invalid("window_size must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.mmr_lambda) {
            return Err(StoreError::invalid("mmr_lambda must be within [0, 1]"));
        }
        if self.mmr_multiplier == 0 {
            return Err(StoreError::invalid("mmr_multiplier must be greater than 0"));
        }
        Ok(())
    }

    /// Size of the over-fetched candidate pool an MMR search of `limit` results needs.
    pub fn mmr_candidate_limit(&self, limit: usize) -> usize {
        limit
            .saturating_mul(self.mmr_multiplier)
            .max(self.mmr_min_candidates)
    }
}

fn overlay<F, T>(lookup: &F, name: &str, slot: &mut T) -> Result<(), StoreError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(name).filter(|value| !value.trim().is_empty()) else {
        return Ok(());
    };
    *slot = raw
        .trim()
        .parse()
        .map_err(|_| StoreError::invalid(format!("{name} has an invalid value: {raw}")))?;
    Ok(())
}
