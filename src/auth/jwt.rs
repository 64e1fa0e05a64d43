//! HMAC JWT validation for Supabase-issued access tokens.

use std::collections::HashMap;

use jsonwebtoken::{Algorithm, DecodingKey, TokenData, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};

use super::AuthError;
use crate::config::AuthConfig;

/// Claims carried by a Supabase access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (Supabase user id)
    #[serde(default)]
    pub sub: String,

    /// Expiration time (Unix timestamp)
    pub exp: u64,

    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: u64,

    #[serde(default)]
    pub email: Option<String>,

    /// All other claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Verifies tokens against the shared project secret.
pub struct JwtValidator {
    decoding_key: DecodingKey,
    allowed_algorithms: Vec<Algorithm>,
    leeway_secs: u64,
}

impl JwtValidator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            allowed_algorithms: config.allowed_algorithms.clone(),
            leeway_secs: config.leeway_secs,
        }
    }

    /// Validate a token and return its claims.
    pub fn validate(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let header = decode_header(token).map_err(|e| {
            tracing::debug!(error = %e, "Failed to decode JWT header");
            AuthError::InvalidToken
        })?;

        // The header algorithm must be on the allowlist before it is used to
        // build the validation rules.
        if !self.allowed_algorithms.contains(&header.alg) {
            tracing::warn!(
                algorithm = ?header.alg,
                allowed = ?self.allowed_algorithms,
                "JWT algorithm not in allowlist"
            );
            return Err(AuthError::InvalidToken);
        }

        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;
        validation.leeway = self.leeway_secs;

        let token_data: TokenData<JwtClaims> = decode(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "JWT validation failed");
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                    _ => AuthError::InvalidToken,
                }
            })?;

        if token_data.claims.sub.is_empty() {
            return Err(AuthError::MissingSubject);
        }

        Ok(token_data.claims)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    use super::*;

    pub(crate) const TEST_SECRET: &str = "super-secret-jwt-token-with-at-least-32-characters";

    fn now() -> u64 {
        chrono::Utc::now().timestamp() as u64
    }

    /// Sign a token for tests. `exp_offset` is relative to now.
    pub(crate) fn sign(sub: &str, email: Option<&str>, exp_offset: i64) -> String {
        let claims = json!({
            "sub": sub,
            "email": email,
            "role": "authenticated",
            "aud": "authenticated",
            "iat": now(),
            "exp": (now() as i64 + exp_offset) as u64,
        });
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn validator() -> JwtValidator {
        JwtValidator::new(&AuthConfig {
            jwt_secret: TEST_SECRET.to_string(),
            allowed_algorithms: vec![Algorithm::HS256],
            leeway_secs: 0,
        })
    }

    #[test]
    fn test_valid_token() {
        let token = sign("user-123", Some("ada@example.com"), 3600);
        let claims = validator().validate(&token).unwrap();
        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.email.as_deref(), Some("ada@example.com"));
        assert_eq!(claims.extra.get("role"), Some(&json!("authenticated")));
        assert_eq!(claims.extra.get("aud"), Some(&json!("authenticated")));
    }

    #[test]
    fn test_expired_token() {
        let token = sign("user-123", None, -3600);
        assert_eq!(validator().validate(&token).unwrap_err(), AuthError::ExpiredToken);
    }

    #[test]
    fn test_wrong_secret() {
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({ "sub": "user-123", "exp": now() + 3600 }),
            &EncodingKey::from_secret(b"another-secret"),
        )
        .unwrap();
        assert_eq!(validator().validate(&token).unwrap_err(), AuthError::InvalidToken);
    }

    #[test]
    fn test_algorithm_not_allowed() {
        let token = encode(
            &Header::new(Algorithm::HS512),
            &json!({ "sub": "user-123", "exp": now() + 3600 }),
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(validator().validate(&token).unwrap_err(), AuthError::InvalidToken);
    }

    #[test]
    fn test_missing_subject() {
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({ "exp": now() + 3600 }),
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(validator().validate(&token).unwrap_err(), AuthError::MissingSubject);
    }

    #[test]
    fn test_garbage_token() {
        assert_eq!(validator().validate("not-a-jwt").unwrap_err(), AuthError::InvalidToken);
    }
}
