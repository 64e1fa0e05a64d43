//! Configuration module for the BRAINTOK backend.
//!
//! The service is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [server]
//! port = 5001
//!
//! [database]
//! type = "postgres"
//! url = "${DATABASE_URL}"
//!
//! [auth]
//! jwt_secret = "${SUPABASE_JWT_SECRET}"
//! ```

mod auth;
mod database;
mod llm;
mod observability;
mod processing;
mod server;
mod storage;
mod vector;

use std::path::Path;

pub use auth::*;
pub use database::*;
pub use llm::*;
pub use observability::*;
pub use processing::*;
use serde::{Deserialize, Serialize};
pub use server::*;
pub use storage::*;
pub use vector::*;

/// Root configuration.
///
/// Every section has defaults except `[auth]`, which must carry the JWT
/// secret, and `[database]`, which must name a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database holding documents, chat messages and the waitlist.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Object storage for uploaded documents.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Vector index used for retrieval.
    #[serde(default)]
    pub vector: VectorConfig,

    /// Chat completion and embedding endpoints.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Text extraction and chunking.
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Bearer token verification.
    pub auth: AuthConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string, expanding environment variables first.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        let config: AppConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.is_none() {
            return Err(ConfigError::Validation(
                "A [database] section is required".into(),
            ));
        }

        if self.vector.dimension != self.llm.embedding_dimensions {
            return Err(ConfigError::Validation(format!(
                "vector.dimension ({}) must equal llm.embedding_dimensions ({})",
                self.vector.dimension, self.llm.embedding_dimensions
            )));
        }

        self.server.validate()?;
        self.database.validate()?;
        self.storage.validate()?;
        self.vector.validate()?;
        self.llm.validate()?;
        self.processing.validate()?;
        self.auth.validate()?;

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand `${VAR}` references. References after a `#` on the same line are
/// left untouched so commented-out settings don't require their variables.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else { continue };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
