use serde::{Deserialize, Serialize};

use super::ConfigError;

/// S3 (or S3-compatible) object storage holding uploaded documents.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Bucket name.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// AWS region (e.g., "us-east-1").
    #[serde(default = "default_region")]
    pub region: Option<String>,

    /// Custom endpoint URL for S3-compatible services.
    /// Examples:
    /// - MinIO: "http://localhost:9000"
    /// - R2: "https://<account-id>.r2.cloudflarestorage.com"
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Access key ID. If not specified, the default AWS credential chain is used.
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Secret access key. If not specified, the default AWS credential chain is used.
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Use path-style URLs instead of virtual-hosted style.
    /// Required for MinIO and some S3-compatible services.
    #[serde(default)]
    pub force_path_style: bool,

    /// Lifetime of presigned upload (PUT) URLs.
    #[serde(default = "default_upload_ttl")]
    pub upload_url_ttl_secs: u64,

    /// Lifetime of presigned download (GET) URLs.
    #[serde(default = "default_download_ttl")]
    pub download_url_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            region: default_region(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
            upload_url_ttl_secs: default_upload_ttl(),
            download_url_ttl_secs: default_download_ttl(),
        }
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field(
                "access_key_id",
                &self.access_key_id.as_ref().map(|_| "****"),
            )
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "****"),
            )
            .field("force_path_style", &self.force_path_style)
            .field("upload_url_ttl_secs", &self.upload_url_ttl_secs)
            .field("download_url_ttl_secs", &self.download_url_ttl_secs)
            .finish()
    }
}

impl StorageConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.is_empty() {
            return Err(ConfigError::Validation(
                "storage.bucket cannot be empty".into(),
            ));
        }
        if self.region.is_none() && self.endpoint.is_none() {
            return Err(ConfigError::Validation(
                "storage requires either 'region' or 'endpoint' to be specified".into(),
            ));
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(ConfigError::Validation(
                "storage.access_key_id and storage.secret_access_key must be set together".into(),
            ));
        }
        // SigV4 presigned URLs cannot outlive seven days.
        const MAX_PRESIGN_SECS: u64 = 7 * 24 * 60 * 60;
        for (name, ttl) in [
            ("upload_url_ttl_secs", self.upload_url_ttl_secs),
            ("download_url_ttl_secs", self.download_url_ttl_secs),
        ] {
            if ttl == 0 || ttl > MAX_PRESIGN_SECS {
                return Err(ConfigError::Validation(format!(
                    "storage.{name} must be between 1 and {MAX_PRESIGN_SECS}"
                )));
            }
        }
        Ok(())
    }
}

fn default_bucket() -> String {
    "braintok".to_string()
}

fn default_region() -> Option<String> {
    Some("us-east-1".to_string())
}

fn default_upload_ttl() -> u64 {
    3600
}

fn default_download_ttl() -> u64 {
    300
}
