pub mod document_processor;
mod documents;
pub mod ingestion;
mod messages;
mod object_storage;
mod tiktok;
mod waitlist;

use std::sync::Arc;

pub use document_processor::{DocumentProcessor, DocumentProcessorError, TextChunk};
pub use documents::{DocumentService, DocumentServiceError, MISSING_OBJECT_ERROR};
pub use ingestion::{IngestionError, IngestionService};
pub use messages::MessageService;
pub use object_storage::{
    ObjectStorage, S3ObjectStorage, StorageError, StorageResult, build_key,
};
pub use tiktok::{TiktokError, TiktokService};
pub use waitlist::WaitlistService;

use crate::{config::StorageConfig, db::DbPool};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub documents: DocumentService,
    pub messages: MessageService,
    pub waitlist: WaitlistService,
    pub tiktok: TiktokService,
    pub ingestion: Arc<IngestionService>,
}

impl Services {
    pub fn new(
        db: Arc<DbPool>,
        storage: Arc<dyn ObjectStorage>,
        ingestion: Arc<IngestionService>,
        storage_config: &StorageConfig,
    ) -> Self {
        Self {
            documents: DocumentService::new(
                db.clone(),
                storage.clone(),
                ingestion.clone(),
                storage_config,
            ),
            messages: MessageService::new(db.clone()),
            waitlist: WaitlistService::new(db),
            tiktok: TiktokService::new(storage),
            ingestion,
        }
    }
}
