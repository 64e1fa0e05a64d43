use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: Uuid,
    pub user_email: String,
    pub s3_key: String,
    pub content: String,
    pub is_user_message: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateMessage {
    pub user_email: String,
    pub s3_key: String,
    pub content: String,
    pub is_user_message: bool,
    pub created_at: DateTime<Utc>,
}

/// Wire shape of a chat message, shared by the history endpoint and the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub content: String,
    /// Unix milliseconds
    pub timestamp: i64,
    pub user_id: String,
    pub is_user: bool,
}

impl From<StoredMessage> for ChatMessage {
    fn from(msg: StoredMessage) -> Self {
        Self {
            content: msg.content,
            timestamp: msg.created_at.timestamp_millis(),
            user_id: msg.user_email,
            is_user: msg.is_user_message,
        }
    }
}
