use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered identity. Owned by the identity store; callers receive clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub username: String,
    /// Compared by exact equality, never exposed on the wire.
    pub password: String,
    pub is_admin: bool,
    pub session_token: String,
    pub last_seen: DateTime<Utc>,
}

/// One entry of the append-only chat log. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub sender_id: u64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}
