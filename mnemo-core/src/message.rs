use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Metadata, SearchResult};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub token_count: i32,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct NewMessage {
    /// Caller-assigned id; generated when absent.
    pub uuid: Option<Uuid>,
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub token_count: i32,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub content: String,
    /// Most recent message folded into this summary.
    pub summary_point_uuid: Uuid,
    #[serde(default)]
    pub token_count: i32,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct NewSummary {
    pub content: String,
    pub summary_point_uuid: Uuid,
    #[serde(default)]
    pub token_count: i32,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
}

/// What a caller should remember about a session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SummaryPage {
    pub summaries: Vec<Summary>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    pub messages: Vec<Message>,
    pub summary: Option<Summary>,
    #[serde(default)]
    pub relevant_summaries: Vec<SearchResult<Summary>>,
}
