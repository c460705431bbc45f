//! Message and typing-signal models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted conversation message.
///
/// `id` is server-assigned and authoritative; within a conversation's
/// displayed sequence messages are unique by `id` and ordered ascending by
/// `created_at`. Nothing but `is_read` is ever mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

/// An ephemeral typing signal. Never persisted; the consumer side expires
/// it after a bounded interval if no stop signal arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    pub conversation_id: i64,
    pub user_id: i64,
}
