use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Pinecone vector index configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VectorConfig {
    /// Pinecone API key.
    #[serde(default)]
    pub api_key: String,

    /// Control plane base URL (index listing, creation, description).
    #[serde(default = "default_control_plane_url")]
    pub control_plane_url: String,

    /// API version sent as `X-Pinecone-API-Version`.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Vector dimension. Must match the embedding model output.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default)]
    pub metric: DistanceMetric,

    /// Serverless cloud used when the index has to be created.
    #[serde(default = "default_cloud")]
    pub cloud: String,

    /// Serverless region used when the index has to be created.
    #[serde(default = "default_region")]
    pub region: String,

    /// Number of chunks retrieved per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Vectors per upsert request.
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,

    /// How many times to poll a newly created index before giving up.
    #[serde(default = "default_ready_max_attempts")]
    pub ready_max_attempts: u32,

    #[serde(default = "default_ready_poll_interval_ms")]
    pub ready_poll_interval_ms: u64,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            control_plane_url: default_control_plane_url(),
            api_version: default_api_version(),
            index_name: default_index_name(),
            dimension: default_dimension(),
            metric: DistanceMetric::default(),
            cloud: default_cloud(),
            region: default_region(),
            top_k: default_top_k(),
            upsert_batch_size: default_upsert_batch_size(),
            ready_max_attempts: default_ready_max_attempts(),
            ready_poll_interval_ms: default_ready_poll_interval_ms(),
            timeout_secs: default_timeout(),
        }
    }
}

impl std::fmt::Debug for VectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorConfig")
            .field("api_key", &"****")
            .field("control_plane_url", &self.control_plane_url)
            .field("index_name", &self.index_name)
            .field("dimension", &self.dimension)
            .field("metric", &self.metric)
            .field("cloud", &self.cloud)
            .field("region", &self.region)
            .field("top_k", &self.top_k)
            .field("upsert_batch_size", &self.upsert_batch_size)
            .finish_non_exhaustive()
    }
}

impl VectorConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.index_name.is_empty() {
            return Err(ConfigError::Validation(
                "vector.index_name cannot be empty".into(),
            ));
        }
        if self.dimension == 0 {
            return Err(ConfigError::Validation(
                "vector.dimension must be greater than 0".into(),
            ));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Validation(
                "vector.top_k must be greater than 0".into(),
            ));
        }
        // Pinecone rejects upserts of more than 1000 vectors.
        if !(1..=1000).contains(&self.upsert_batch_size) {
            return Err(ConfigError::Validation(
                "vector.upsert_batch_size must be between 1 and 1000".into(),
            ));
        }
        Ok(())
    }
}

/// Similarity metric for a new index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
    Dotproduct,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Dotproduct => "dotproduct",
        }
    }
}

fn default_control_plane_url() -> String {
    "https://api.pinecone.io".to_string()
}

fn default_api_version() -> String {
    "2024-07".to_string()
}

fn default_index_name() -> String {
    "braintok".to_string()
}

fn default_dimension() -> usize {
    1024
}

fn default_cloud() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_upsert_batch_size() -> usize {
    100
}

fn default_ready_max_attempts() -> u32 {
    10
}

fn default_ready_poll_interval_ms() -> u64 {
    2000
}

fn default_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(1000, true)]
    #[case(1001, false)]
    fn test_upsert_batch_bounds(#[case] batch: usize, #[case] ok: bool) {
        let config = VectorConfig {
            upsert_batch_size: batch,
            ..Default::default()
        };
        assert_eq!(config.validate().is_ok(), ok);
    }

    #[test]
    fn test_metric_parsing() {
        let config: VectorConfig = toml::from_str("metric = \"dotproduct\"").unwrap();
        assert_eq!(config.metric, DistanceMetric::Dotproduct);
        assert_eq!(config.metric.as_str(), "dotproduct");
    }
}
