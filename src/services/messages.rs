use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    db::{DbPool, DbResult},
    models::{ChatMessage, CreateMessage, StoredMessage},
};

/// Chat history for a user and document.
#[derive(Clone)]
pub struct MessageService {
    db: Arc<DbPool>,
}

impl MessageService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Newest first.
    pub async fn get_all(&self, email: &str, s3_key: &str) -> DbResult<Vec<ChatMessage>> {
        let messages = self.db.messages().list_for_document(email, s3_key).await?;
        Ok(messages.into_iter().map(ChatMessage::from).collect())
    }

    /// Store a question and its answer. The answer is stamped one second after
    /// the question so the pair always sorts in conversation order.
    pub async fn save_message_pair(
        &self,
        email: &str,
        s3_key: &str,
        user_content: &str,
        bot_content: &str,
    ) -> DbResult<Vec<StoredMessage>> {
        let now = Utc::now();
        let message = |content: &str, is_user_message, created_at| CreateMessage {
            user_email: email.to_string(),
            s3_key: s3_key.to_string(),
            content: content.to_string(),
            is_user_message,
            created_at,
        };

        self.db
            .messages()
            .create_many(vec![
                message(user_content, true, now),
                message(bot_content, false, now + Duration::seconds(1)),
            ])
            .await
    }
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use super::*;
    use crate::tests::fakes::sqlite_db;

    #[tokio::test]
    async fn test_pair_ordering() {
        let service = MessageService::new(sqlite_db().await);
        let key = "ada@example.com/1_owls.pdf";

        let stored = service
            .save_message_pair("ada@example.com", key, "What are owls?", "Birds.")
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored[1].created_at > stored[0].created_at);

        let history = service.get_all("ada@example.com", key).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Birds.");
        assert!(!history[0].is_user);
        assert_eq!(history[1].content, "What are owls?");
        assert!(history[1].is_user);
        assert_eq!(history[0].timestamp - history[1].timestamp, 1000);
        assert_eq!(history[1].user_id, "ada@example.com");
    }

    #[tokio::test]
    async fn test_history_scoped_to_document() {
        let service = MessageService::new(sqlite_db().await);
        service
            .save_message_pair("ada@example.com", "a", "q", "a")
            .await
            .unwrap();

        assert!(service.get_all("ada@example.com", "b").await.unwrap().is_empty());
        assert!(service.get_all("bob@example.com", "a").await.unwrap().is_empty());
    }
}
