//! Document indexing: fetch, extract, chunk, embed, upsert.

use std::{sync::Arc, time::Instant};

use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, error, info, info_span, instrument, warn};

use super::{
    DocumentProcessor, DocumentProcessorError, ObjectStorage, StorageError,
};
use crate::{
    db::{DbError, DbPool},
    llm::{EmbeddingError, EmbeddingProvider},
    models::{Document, UploadStatus},
    vector_store::{VectorStore, VectorStoreError},
};

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Processing(#[from] DocumentProcessorError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

/// Embed `query` and return the text of the closest chunks of one document.
pub async fn vector_search(
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    query: &str,
    user_email: &str,
    s3_key: &str,
    top_k: usize,
) -> Result<Vec<String>, IngestionError> {
    let vector = embedder.embed_query(query).await?;
    let matches = store.query(user_email, s3_key, &vector, top_k).await?;
    Ok(matches
        .into_iter()
        .map(|m| m.text)
        .filter(|t| !t.is_empty())
        .collect())
}

pub struct IngestionService {
    db: Arc<DbPool>,
    storage: Arc<dyn ObjectStorage>,
    processor: Arc<DocumentProcessor>,
    embedder: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl IngestionService {
    pub fn new(
        db: Arc<DbPool>,
        storage: Arc<dyn ObjectStorage>,
        processor: Arc<DocumentProcessor>,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        top_k: usize,
    ) -> Self {
        Self {
            db,
            storage,
            processor,
            embedder,
            vector_store,
            top_k,
        }
    }

    /// Run the pipeline for one document. Returns the number of chunks indexed.
    #[instrument(skip(self, document), fields(document_id = %document.id, s3_key = %document.s3_key))]
    pub async fn ingest_document(&self, document: &Document) -> Result<usize, IngestionError> {
        let started = Instant::now();

        let stage = Instant::now();
        let data = self.storage.get(&document.s3_key).await?;
        info!(
            stage = "fetch",
            bytes = data.len(),
            duration_ms = stage.elapsed().as_millis() as u64,
            "Fetched document"
        );

        let stage = Instant::now();
        let text = self
            .processor
            .extract_text(data, &document.filename, Some(&document.file_type))
            .await?;
        info!(
            stage = "extract",
            chars = text.len(),
            duration_ms = stage.elapsed().as_millis() as u64,
            "Extracted text"
        );

        let stage = Instant::now();
        let chunks = self.processor.chunk_text(&text);
        if chunks.is_empty() {
            return Err(DocumentProcessorError::NoText.into());
        }
        info!(
            stage = "chunk",
            chunks = chunks.len(),
            tokens = chunks.iter().map(|c| c.token_count).sum::<usize>(),
            duration_ms = stage.elapsed().as_millis() as u64,
            "Chunked text"
        );

        let stage = Instant::now();
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        info!(
            stage = "embed",
            vectors = embeddings.len(),
            duration_ms = stage.elapsed().as_millis() as u64,
            "Embedded chunks"
        );

        let stage = Instant::now();
        let written = self
            .vector_store
            .upsert_chunks(&document.user_email, &document.s3_key, &chunks, &embeddings)
            .await?;
        info!(
            stage = "upsert",
            vectors = written,
            duration_ms = stage.elapsed().as_millis() as u64,
            "Upserted vectors"
        );

        info!(
            chunks = written,
            duration_ms = started.elapsed().as_millis() as u64,
            "Document indexed"
        );
        Ok(written)
    }

    /// Index a document, marking it `failed` if any stage fails.
    pub async fn index_document(&self, document: Document) {
        let Err(e) = self.ingest_document(&document).await else {
            return;
        };

        error!(document_id = %document.id, error = %e, "Document indexing failed");
        let reason = format!("Indexing failed: {e}");
        if let Err(db_err) = self
            .db
            .documents()
            .update_status(document.id, UploadStatus::Failed, Some(&reason))
            .await
        {
            error!(document_id = %document.id, error = %db_err, "Failed to record indexing failure");
        }
    }

    /// Index a document on the tracker so shutdown waits for it.
    pub fn schedule(self: &Arc<Self>, tracker: &TaskTracker, document: Document) {
        let span = info_span!("index_document", document_id = %document.id);
        let this = Arc::clone(self);
        tracker.spawn(async move { this.index_document(document).await }.instrument(span));
    }

    pub async fn vector_search(
        &self,
        query: &str,
        user_email: &str,
        s3_key: &str,
    ) -> Result<Vec<String>, IngestionError> {
        vector_search(
            self.embedder.as_ref(),
            self.vector_store.as_ref(),
            query,
            user_email,
            s3_key,
            self.top_k,
        )
        .await
    }

    /// Remove a document's vectors. Failures are logged, not returned.
    pub async fn remove_document(&self, user_email: &str, s3_key: &str) {
        if let Err(e) = self.vector_store.delete_document(user_email, s3_key).await {
            warn!(s3_key, error = %e, "Failed to delete document vectors");
        }
    }
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use super::*;
    use crate::{
        config::ProcessingConfig,
        models::CreateDocument,
        tests::fakes::{FakeEmbedder, FakeObjectStorage, FakeVectorStore, sqlite_db},
    };

    struct Harness {
        db: Arc<DbPool>,
        storage: Arc<FakeObjectStorage>,
        vectors: Arc<FakeVectorStore>,
        service: Arc<IngestionService>,
    }

    async fn harness() -> Harness {
        let db = sqlite_db().await;
        let storage = Arc::new(FakeObjectStorage::default());
        let vectors = Arc::new(FakeVectorStore::default());
        let processor = Arc::new(
            DocumentProcessor::new(ProcessingConfig {
                chunk_size: 20,
                chunk_overlap: 5,
                ..Default::default()
            })
            .unwrap(),
        );
        let service = Arc::new(IngestionService::new(
            db.clone(),
            storage.clone(),
            processor,
            Arc::new(FakeEmbedder::default()),
            vectors.clone(),
            3,
        ));
        Harness {
            db,
            storage,
            vectors,
            service,
        }
    }

    async fn create_document(db: &DbPool, s3_key: &str, file_type: &str) -> Document {
        db.documents()
            .create(CreateDocument {
                user_email: "ada@example.com".to_string(),
                filename: "owls.txt".to_string(),
                s3_key: s3_key.to_string(),
                file_size: 64,
                file_type: file_type.to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ingest_text_document() {
        let h = harness().await;
        let key = "ada@example.com/1_owls.txt";
        h.storage.put(key, "Owls are birds of prey. They hunt at night and sleep by day.");
        let doc = create_document(&h.db, key, "text/plain").await;

        let written = h.service.ingest_document(&doc).await.unwrap();

        assert!(written >= 3);
        let stored = h.vectors.chunks_for("ada@example.com", key);
        assert_eq!(stored.len(), written);
        assert!(stored[0].starts_with("Owls are birds"));
    }

    #[tokio::test]
    async fn test_index_failure_marks_document_failed() {
        let h = harness().await;
        let doc = create_document(&h.db, "ada@example.com/1_missing.txt", "text/plain").await;

        h.service.index_document(doc.clone()).await;

        let updated = h.db.documents().get(doc.id).await.unwrap().unwrap();
        assert_eq!(updated.upload_status, UploadStatus::Failed);
        let error = updated.error.unwrap();
        assert!(error.starts_with("Indexing failed: "), "{error}");
    }

    #[tokio::test]
    async fn test_unsupported_format_fails() {
        let h = harness().await;
        let key = "ada@example.com/1_slides.pptx";
        h.storage.put(key, "PK binary");
        let doc = create_document(&h.db, key, "application/vnd.ms-powerpoint").await;

        let result = h.service.ingest_document(&doc).await;
        assert!(matches!(
            result,
            Err(IngestionError::Processing(DocumentProcessorError::UnsupportedFormat(_)))
        ));
    }

    #[tokio::test]
    async fn test_vector_search_returns_texts_for_document() {
        let h = harness().await;
        let key = "ada@example.com/1_owls.txt";
        h.storage.put(key, "Owls are birds of prey. They hunt at night.");
        let doc = create_document(&h.db, key, "text/plain").await;
        h.service.ingest_document(&doc).await.unwrap();

        let texts = h
            .service
            .vector_search("owls", "ada@example.com", key)
            .await
            .unwrap();
        assert!(!texts.is_empty());
        assert!(texts.len() <= 3);

        let other_user = h
            .service
            .vector_search("owls", "bob@example.com", key)
            .await
            .unwrap();
        assert!(other_user.is_empty());
    }

    #[tokio::test]
    async fn test_schedule_runs_on_tracker() {
        let h = harness().await;
        let key = "ada@example.com/1_owls.txt";
        h.storage.put(key, "Owls hunt at night.");
        let doc = create_document(&h.db, key, "text/plain").await;

        let tracker = TaskTracker::new();
        h.service.schedule(&tracker, doc);
        tracker.close();
        tracker.wait().await;

        assert!(!h.vectors.chunks_for("ada@example.com", key).is_empty());
    }
}
