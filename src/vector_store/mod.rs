//! Vector index abstraction.
//!
//! Chunks are stored per user namespace and tagged with the document key, so
//! every query is scoped to one user and one document.

mod pinecone;

use async_trait::async_trait;
pub use pinecone::PineconeStore;
use thiserror::Error;

use crate::services::TextChunk;

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Vector store API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Index {0} did not become ready")]
    IndexNotReady(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type VectorStoreResult<T> = Result<T, VectorStoreError>;

/// A chunk returned by a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub chunk_index: Option<u64>,
}

/// Vector id of a chunk: `{s3_key}#{chunk_index}`.
pub fn chunk_vector_id(s3_key: &str, chunk_index: usize) -> String {
    format!("{s3_key}#{chunk_index}")
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store one vector per chunk in the user's namespace.
    /// `embeddings[i]` belongs to `chunks[i]`. Returns the number of vectors written.
    async fn upsert_chunks(
        &self,
        user_email: &str,
        s3_key: &str,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> VectorStoreResult<usize>;

    /// Nearest chunks of one document, best match first.
    async fn query(
        &self,
        user_email: &str,
        s3_key: &str,
        vector: &[f32],
        top_k: usize,
    ) -> VectorStoreResult<Vec<ScoredChunk>>;

    /// Remove every vector of a document. Returns the number of ids deleted.
    async fn delete_document(&self, user_email: &str, s3_key: &str) -> VectorStoreResult<usize>;
}
