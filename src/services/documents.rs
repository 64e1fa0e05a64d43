use std::{sync::Arc, time::Duration};

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::{IngestionService, ObjectStorage, StorageError, build_key};
use crate::{
    config::StorageConfig,
    db::{DbError, DbPool, DbResult},
    models::{
        CreateDocument, Document, UploadConfirmation, UploadFile, UploadStatus, UploadTicket,
    },
};

pub const MISSING_OBJECT_ERROR: &str = "File not found in S3";

const MAX_KEY_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum DocumentServiceError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

/// Service layer for uploaded documents.
#[derive(Clone)]
pub struct DocumentService {
    db: Arc<DbPool>,
    storage: Arc<dyn ObjectStorage>,
    ingestion: Arc<IngestionService>,
    upload_ttl: Duration,
    download_ttl: Duration,
}

impl DocumentService {
    pub fn new(
        db: Arc<DbPool>,
        storage: Arc<dyn ObjectStorage>,
        ingestion: Arc<IngestionService>,
        config: &StorageConfig,
    ) -> Self {
        Self {
            db,
            storage,
            ingestion,
            upload_ttl: Duration::from_secs(config.upload_url_ttl_secs),
            download_ttl: Duration::from_secs(config.download_url_ttl_secs),
        }
    }

    /// Presign an upload URL and record a pending row for each file.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn request_uploads(
        &self,
        email: &str,
        files: &[UploadFile],
    ) -> Result<Vec<UploadTicket>, DocumentServiceError> {
        self.issue_tickets(email, files, Utc::now().timestamp_millis())
            .await
    }

    /// Files in one request get consecutive timestamps so their keys differ
    /// even when the sanitized names match. A key already taken by another
    /// request is retried further along.
    async fn issue_tickets(
        &self,
        email: &str,
        files: &[UploadFile],
        base_ms: i64,
    ) -> Result<Vec<UploadTicket>, DocumentServiceError> {
        let stride = files.len() as i64;
        let mut tickets = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let mut timestamp_ms = base_ms + index as i64;
            let mut attempt = 1;
            let (document, s3_key, presigned_url) = loop {
                let s3_key = build_key(email, &file.filename, timestamp_ms);
                let presigned_url = self
                    .storage
                    .presign_put(&s3_key, &file.file_type, self.upload_ttl)
                    .await?;
                match self
                    .create_pending(email, &file.filename, &s3_key, file.size, &file.file_type)
                    .await
                {
                    Ok(document) => break (document, s3_key, presigned_url),
                    Err(DbError::Conflict(_)) if attempt < MAX_KEY_ATTEMPTS => {
                        warn!(s3_key = %s3_key, attempt, "Upload key taken, retrying");
                        timestamp_ms += stride;
                        attempt += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            };
            info!(document_id = %document.id, s3_key = %s3_key, "Issued upload URL");
            tickets.push(UploadTicket {
                document_id: document.id,
                presigned_url,
                s3_key,
            });
        }
        Ok(tickets)
    }

    pub async fn create_pending(
        &self,
        email: &str,
        filename: &str,
        s3_key: &str,
        file_size: i64,
        file_type: &str,
    ) -> DbResult<Document> {
        self.db
            .documents()
            .create(CreateDocument {
                user_email: email.to_string(),
                filename: filename.to_string(),
                s3_key: s3_key.to_string(),
                file_size,
                file_type: file_type.to_string(),
            })
            .await
    }

    /// Apply client-reported upload outcomes.
    ///
    /// A `completed` report for an object that is not in storage is recorded
    /// as `failed`. Rows owned by another email are left alone. Returns the
    /// documents that ended `completed`, ready for indexing.
    #[instrument(skip(self, confirmations), fields(documents = confirmations.len()))]
    pub async fn process_upload_completion(
        &self,
        email: &str,
        confirmations: Vec<UploadConfirmation>,
    ) -> Result<Vec<Document>, DocumentServiceError> {
        let repo = self.db.documents();
        let mut completed = Vec::new();

        for mut confirmation in confirmations {
            if confirmation.status == UploadStatus::Completed
                && !self.storage.exists(&confirmation.s3_key).await?
            {
                warn!(s3_key = %confirmation.s3_key, "Uploaded object not found");
                confirmation.status = UploadStatus::Failed;
                confirmation.error = Some(MISSING_OBJECT_ERROR.to_string());
            }

            let matched = repo
                .update_status_for_owner(
                    confirmation.document_id,
                    email,
                    confirmation.status,
                    confirmation.error.as_deref(),
                )
                .await?;
            if !matched {
                warn!(document_id = %confirmation.document_id, "No document owned by caller");
                continue;
            }

            if confirmation.status == UploadStatus::Completed
                && let Some(document) = repo.get(confirmation.document_id).await?
            {
                completed.push(document);
            }
        }

        Ok(completed)
    }

    pub async fn list_by_email(&self, email: &str) -> DbResult<Vec<Document>> {
        self.db.documents().list_by_email(email).await
    }

    pub async fn get_by_s3_key(&self, email: &str, s3_key: &str) -> DbResult<Option<Document>> {
        self.db.documents().get_by_s3_key(email, s3_key).await
    }

    pub async fn access_link(&self, s3_key: &str) -> Result<String, DocumentServiceError> {
        Ok(self.storage.presign_get(s3_key, self.download_ttl).await?)
    }

    /// Remove a document's object, vectors, chat history and row.
    /// Returns `false` without touching anything if the caller owns no such document.
    #[instrument(skip(self))]
    pub async fn delete_by_s3_key(
        &self,
        email: &str,
        s3_key: &str,
    ) -> Result<bool, DocumentServiceError> {
        if self.get_by_s3_key(email, s3_key).await?.is_none() {
            return Ok(false);
        }

        self.storage.delete(s3_key).await?;
        self.ingestion.remove_document(email, s3_key).await;
        let messages = self.db.messages().delete_for_document(email, s3_key).await?;
        let deleted = self.db.documents().delete_by_s3_key(email, s3_key).await?;

        info!(messages, "Document deleted");
        Ok(deleted)
    }
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use super::*;
    use crate::{
        config::ProcessingConfig,
        services::DocumentProcessor,
        tests::fakes::{FakeEmbedder, FakeObjectStorage, FakeVectorStore, sqlite_db},
        vector_store::VectorStore,
    };

    const EMAIL: &str = "ada@example.com";

    struct Harness {
        storage: Arc<FakeObjectStorage>,
        vectors: Arc<FakeVectorStore>,
        service: DocumentService,
    }

    async fn harness() -> Harness {
        let db = sqlite_db().await;
        let storage = Arc::new(FakeObjectStorage::default());
        let vectors = Arc::new(FakeVectorStore::default());
        let ingestion = Arc::new(IngestionService::new(
            db.clone(),
            storage.clone(),
            Arc::new(DocumentProcessor::new(ProcessingConfig::default()).unwrap()),
            Arc::new(FakeEmbedder),
            vectors.clone(),
            5,
        ));
        let service =
            DocumentService::new(db, storage.clone(), ingestion, &StorageConfig::default());
        Harness {
            storage,
            vectors,
            service,
        }
    }

    fn pdf(name: &str) -> UploadFile {
        UploadFile {
            filename: name.to_string(),
            file_type: "application/pdf".to_string(),
            size: 1024,
        }
    }

    fn confirm(ticket: &UploadTicket, status: UploadStatus) -> UploadConfirmation {
        UploadConfirmation {
            document_id: ticket.document_id,
            s3_key: ticket.s3_key.clone(),
            status,
            error: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_request_uploads_creates_pending_rows() {
        let h = harness().await;

        let tickets = h
            .service
            .request_uploads(EMAIL, &[pdf("owls.pdf"), pdf("my notes.pdf")])
            .await
            .unwrap();

        assert_eq!(tickets.len(), 2);
        assert!(tickets[0].s3_key.starts_with("ada@example.com/"));
        assert!(tickets[1].s3_key.ends_with("_my_notes.pdf"));
        assert!(tickets[0].presigned_url.contains("op=put&ttl=3600"));

        let docs = h.service.list_by_email(EMAIL).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.upload_status == UploadStatus::Pending));
    }

    #[tokio::test]
    async fn test_same_named_files_get_distinct_keys() {
        let h = harness().await;

        let tickets = h
            .service
            .request_uploads(
                EMAIL,
                &[pdf("my notes.pdf"), pdf("my_notes.pdf"), pdf("my notes.pdf")],
            )
            .await
            .unwrap();

        let mut keys: Vec<_> = tickets.iter().map(|t| t.s3_key.as_str()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 3);
        assert_eq!(h.service.list_by_email(EMAIL).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_taken_key_is_retried() {
        let h = harness().await;
        let taken = build_key(EMAIL, "owls.pdf", 1_000);
        h.service
            .create_pending(EMAIL, "owls.pdf", &taken, 1024, "application/pdf")
            .await
            .unwrap();

        let tickets = h
            .service
            .issue_tickets(EMAIL, &[pdf("owls.pdf"), pdf("bats.pdf")], 1_000)
            .await
            .unwrap();

        assert_eq!(tickets[0].s3_key, build_key(EMAIL, "owls.pdf", 1_002));
        assert_eq!(tickets[1].s3_key, build_key(EMAIL, "bats.pdf", 1_001));
        assert_eq!(h.service.list_by_email(EMAIL).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_completion_marks_missing_object_failed() {
        let h = harness().await;
        let tickets = h
            .service
            .request_uploads(EMAIL, &[pdf("here.pdf"), pdf("gone.pdf")])
            .await
            .unwrap();
        h.storage.put(&tickets[0].s3_key, "%PDF-1.4");

        let completed = h
            .service
            .process_upload_completion(
                EMAIL,
                tickets
                    .iter()
                    .map(|t| confirm(t, UploadStatus::Completed))
                    .collect(),
            )
            .await
            .unwrap();

        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, tickets[0].document_id);

        let gone = h
            .service
            .get_by_s3_key(EMAIL, &tickets[1].s3_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(gone.upload_status, UploadStatus::Failed);
        assert_eq!(gone.error.as_deref(), Some(MISSING_OBJECT_ERROR));
    }

    #[tokio::test]
    async fn test_completion_ignores_other_owner() {
        let h = harness().await;
        let tickets = h
            .service
            .request_uploads(EMAIL, &[pdf("owls.pdf")])
            .await
            .unwrap();
        h.storage.put(&tickets[0].s3_key, "%PDF-1.4");

        let completed = h
            .service
            .process_upload_completion(
                "mallory@example.com",
                vec![confirm(&tickets[0], UploadStatus::Completed)],
            )
            .await
            .unwrap();

        assert!(completed.is_empty());
        let doc = h
            .service
            .get_by_s3_key(EMAIL, &tickets[0].s3_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.upload_status, UploadStatus::Pending);
    }

    #[tokio::test]
    async fn test_client_reported_failure_kept() {
        let h = harness().await;
        let tickets = h
            .service
            .request_uploads(EMAIL, &[pdf("owls.pdf")])
            .await
            .unwrap();
        let mut confirmation = confirm(&tickets[0], UploadStatus::Failed);
        confirmation.error = Some("Network error".into());

        let completed = h
            .service
            .process_upload_completion(EMAIL, vec![confirmation])
            .await
            .unwrap();

        assert!(completed.is_empty());
        let doc = h
            .service
            .get_by_s3_key(EMAIL, &tickets[0].s3_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.error.as_deref(), Some("Network error"));
    }

    #[tokio::test]
    async fn test_delete_removes_object_vectors_and_row() {
        let h = harness().await;
        let tickets = h
            .service
            .request_uploads(EMAIL, &[pdf("owls.pdf")])
            .await
            .unwrap();
        let key = &tickets[0].s3_key;
        h.storage.put(key, "Owls hunt at night.");
        h.vectors
            .upsert_chunks(
                EMAIL,
                key,
                &[crate::services::TextChunk {
                    content: "Owls hunt at night.".into(),
                    index: 0,
                    char_start: 0,
                    char_end: 19,
                    token_count: 5,
                }],
                &[vec![1.0, 0.0]],
            )
            .await
            .unwrap();

        assert!(h.service.delete_by_s3_key(EMAIL, key).await.unwrap());

        assert!(!h.storage.contains(key));
        assert!(h.vectors.chunks_for(EMAIL, key).is_empty());
        assert!(h.service.get_by_s3_key(EMAIL, key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_unknown_key_touches_nothing() {
        let h = harness().await;
        h.storage.put("bob@example.com/1_x.pdf", "x");

        let deleted = h
            .service
            .delete_by_s3_key(EMAIL, "bob@example.com/1_x.pdf")
            .await
            .unwrap();

        assert!(!deleted);
        assert!(h.storage.contains("bob@example.com/1_x.pdf"));
    }

    #[tokio::test]
    async fn test_access_link_uses_download_ttl() {
        let h = harness().await;
        let url = h.service.access_link("ada@example.com/1_owls.pdf").await.unwrap();
        assert!(url.contains("op=get&ttl=300"));
    }
}
