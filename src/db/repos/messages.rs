use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{CreateMessage, StoredMessage},
};

#[async_trait]
pub trait MessageRepo: Send + Sync {
    /// Insert all messages atomically.
    async fn create_many(&self, messages: Vec<CreateMessage>) -> DbResult<Vec<StoredMessage>>;

    /// Messages for one user and document, newest first.
    async fn list_for_document(
        &self,
        user_email: &str,
        s3_key: &str,
    ) -> DbResult<Vec<StoredMessage>>;

    /// Remove a document's chat history. Returns the number of rows deleted.
    async fn delete_for_document(&self, user_email: &str, s3_key: &str) -> DbResult<u64>;
}
