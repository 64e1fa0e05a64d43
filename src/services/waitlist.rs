use std::sync::Arc;

use crate::{
    db::{DbPool, DbResult},
    models::{CreateWaitlistEntry, WaitlistEntry},
};

#[derive(Clone)]
pub struct WaitlistService {
    db: Arc<DbPool>,
}

impl WaitlistService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Callers validate the entry first.
    pub async fn submit(&self, entry: CreateWaitlistEntry) -> DbResult<WaitlistEntry> {
        self.db.waitlist().create(entry).await
    }

    pub async fn list_all(&self) -> DbResult<Vec<WaitlistEntry>> {
        self.db.waitlist().list().await
    }
}
