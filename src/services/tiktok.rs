use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};
use url::Url;

use super::{ObjectStorage, StorageError};

#[derive(Debug, Error)]
pub enum TiktokError {
    #[error("Invalid document URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Turns documents into short videos. Only the document fetch exists so far.
#[derive(Clone)]
pub struct TiktokService {
    storage: Arc<dyn ObjectStorage>,
}

impl TiktokService {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Resolve the object behind a (possibly presigned) document URL and
    /// confirm it can be read. Returns the object key.
    #[instrument(skip(self))]
    pub async fn build_from_document(&self, pdf_url: &str) -> Result<String, TiktokError> {
        let s3_key = key_from_url(pdf_url)?;
        let content = self.storage.get(&s3_key).await?;
        info!(s3_key = %s3_key, bytes = content.len(), "Fetched document for video build");
        Ok(s3_key)
    }
}

/// The object key is the URL path minus its leading slash, percent-decoded.
pub fn key_from_url(pdf_url: &str) -> Result<String, TiktokError> {
    let url = Url::parse(pdf_url).map_err(|e| TiktokError::InvalidUrl(e.to_string()))?;
    let path = url.path().strip_prefix('/').unwrap_or(url.path());
    if path.is_empty() {
        return Err(TiktokError::InvalidUrl("URL has no object path".into()));
    }
    urlencoding::decode(path)
        .map(|key| key.into_owned())
        .map_err(|e| TiktokError::InvalidUrl(e.to_string()))
}
