use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Metadata;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Monotonic row id, used as the pagination cursor.
    pub id: i64,
    pub uuid: Uuid,
    pub session_id: String,
    pub user_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CreateSessionRequest {
    pub session_id: String,
    pub user_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateSessionRequest {
    pub session_id: String,
    /// Merged into the stored metadata; `None` leaves it untouched.
    pub metadata: Option<Metadata>,
    /// Clears a soft delete when set.
    #[serde(default)]
    pub undelete: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionPage {
    pub sessions: Vec<Session>,
    /// Cursor to pass to the next `list_sessions` call; `None` when exhausted.
    pub next_cursor: Option<i64>,
}
