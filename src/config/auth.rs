use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Bearer token verification for REST routes and the chat socket.
///
/// Tokens are issued by Supabase and signed with the project's JWT secret.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Shared HMAC secret (Supabase "JWT Secret").
    pub jwt_secret: String,

    /// Accepted signing algorithms. Only HMAC algorithms are valid.
    #[serde(default = "default_algorithms")]
    pub allowed_algorithms: Vec<Algorithm>,

    /// Clock skew tolerance for `exp`/`nbf` in seconds.
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"****")
            .field("allowed_algorithms", &self.allowed_algorithms)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

impl AuthConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::Validation(
                "auth.jwt_secret cannot be empty".into(),
            ));
        }
        if self.allowed_algorithms.is_empty() {
            return Err(ConfigError::Validation(
                "auth.allowed_algorithms cannot be empty".into(),
            ));
        }
        if let Some(alg) = self
            .allowed_algorithms
            .iter()
            .find(|a| !matches!(a, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512))
        {
            return Err(ConfigError::Validation(format!(
                "auth.allowed_algorithms: {alg:?} is not an HMAC algorithm"
            )));
        }
        Ok(())
    }
}

fn default_algorithms() -> Vec<Algorithm> {
    vec![Algorithm::HS256]
}

fn default_leeway() -> u64 {
    60
}
