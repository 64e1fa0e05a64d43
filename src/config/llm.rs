use serde::{Deserialize, Serialize};

use super::ConfigError;

/// OpenAI-compatible chat and embedding configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,

    /// Base URL including the version segment.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Optional cap on completion length.
    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Requested embedding size. Must equal `vector.dimension`.
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    /// Texts per embedding request.
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,

    /// Number of question/answer exchanges kept in conversation memory.
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            temperature: default_temperature(),
            max_tokens: None,
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            embedding_batch_size: default_embedding_batch_size(),
            memory_window: default_memory_window(),
            timeout_secs: default_timeout(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &"****")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("temperature", &self.temperature)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("memory_window", &self.memory_window)
            .finish_non_exhaustive()
    }
}

impl LlmConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Validation(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.memory_window == 0 {
            return Err(ConfigError::Validation(
                "llm.memory_window must be greater than 0".into(),
            ));
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::Validation(
                "llm.embedding_batch_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> usize {
    1024
}

fn default_embedding_batch_size() -> usize {
    64
}

fn default_memory_window() -> usize {
    10
}

fn default_timeout() -> u64 {
    60
}
