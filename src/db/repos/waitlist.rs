use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{CreateWaitlistEntry, WaitlistEntry},
};

#[async_trait]
pub trait WaitlistRepo: Send + Sync {
    /// Fails with `Conflict` if the email is already on the list.
    async fn create(&self, input: CreateWaitlistEntry) -> DbResult<WaitlistEntry>;

    /// All entries, newest first.
    async fn list(&self) -> DbResult<Vec<WaitlistEntry>>;
}
