//! Object storage for uploaded documents.
//!
//! Clients upload and download directly against presigned URLs; the server
//! only signs, checks existence, reads objects for indexing and deletes them.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Presigning error: {0}")]
    Presign(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Signed URL the browser can PUT the file body to.
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> StorageResult<String>;

    /// Signed URL for downloading an object.
    async fn presign_get(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Build the object key for an upload: `{email}/{timestamp_ms}_{filename}`.
///
/// Characters outside a conservative set are replaced with `_` so keys are
/// safe in URLs and in vector ids.
pub fn build_key(email: &str, filename: &str, timestamp_ms: i64) -> String {
    let email = sanitize(email, |c| c.is_ascii_alphanumeric() || "@._-".contains(c));
    let filename = sanitize(filename, |c| c.is_ascii_alphanumeric() || "._-".contains(c));
    format!("{email}/{timestamp_ms}_{filename}")
}

fn sanitize(input: &str, keep: impl Fn(char) -> bool) -> String {
    input
        .chars()
        .map(|c| if keep(c) { c } else { '_' })
        .collect()
}

fn presigning_config(ttl: Duration) -> StorageResult<PresigningConfig> {
    PresigningConfig::expires_in(ttl).map_err(|e| StorageError::Presign(e.to_string()))
}

/// S3-compatible storage backed by `aws-sdk-s3`.
///
/// Works against AWS S3, MinIO, R2 and other services that speak the S3 API.
pub struct S3ObjectStorage {
    bucket: String,
    client: aws_sdk_s3::Client,
}

impl S3ObjectStorage {
    pub async fn new(config: &StorageConfig) -> Self {
        info!(bucket = %config.bucket, "Initializing S3 object storage");

        let mut sdk_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &config.region {
            sdk_config_builder = sdk_config_builder.region(aws_config::Region::new(region.clone()));
        }

        // Explicit keys override the default credential chain.
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = aws_credential_types::Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "braintok-config",
            );
            sdk_config_builder = sdk_config_builder.credentials_provider(credentials);
        }

        let sdk_config = sdk_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        Self {
            bucket: config.bucket.clone(),
            client: aws_sdk_s3::Client::from_conf(s3_config_builder.build()),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> StorageResult<String> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning_config(ttl)?)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to presign upload URL");
                StorageError::Presign(e.to_string())
            })?;

        debug!(key, "Presigned upload URL");
        Ok(request.uri().to_string())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn presign_get(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config(ttl)?)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to presign download URL");
                StorageError::Presign(e.to_string())
            })?;

        Ok(request.uri().to_string())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(StorageError::S3(e.to_string())),
        }
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    error!(error = %e, "Failed to download from S3");
                    StorageError::S3(e.to_string())
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(format!("Failed to read S3 response body: {e}")))?;

        Ok(body.into_bytes())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to delete from S3");
                StorageError::S3(e.to_string())
            })?;

        info!(key, bucket = %self.bucket, "Object deleted from S3");
        Ok(())
    }
}
