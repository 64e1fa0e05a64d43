use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{CreateDocument, Document, UploadStatus},
};

#[async_trait]
pub trait DocumentRepo: Send + Sync {
    /// Insert a new `pending` document.
    async fn create(&self, input: CreateDocument) -> DbResult<Document>;

    async fn get(&self, id: Uuid) -> DbResult<Option<Document>>;

    async fn get_by_s3_key(&self, user_email: &str, s3_key: &str) -> DbResult<Option<Document>>;

    /// All documents owned by `user_email`, oldest first.
    async fn list_by_email(&self, user_email: &str) -> DbResult<Vec<Document>>;

    /// Update status by id alone. Used by background indexing.
    async fn update_status(
        &self,
        id: Uuid,
        status: UploadStatus,
        error: Option<&str>,
    ) -> DbResult<()>;

    /// Update status only if the row belongs to `user_email`.
    /// Returns whether a row matched.
    async fn update_status_for_owner(
        &self,
        id: Uuid,
        user_email: &str,
        status: UploadStatus,
        error: Option<&str>,
    ) -> DbResult<bool>;

    /// Returns whether a row was deleted.
    async fn delete_by_s3_key(&self, user_email: &str, s3_key: &str) -> DbResult<bool>;
}
