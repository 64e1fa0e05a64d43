use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer token on the request
    MissingToken,

    /// Signature, algorithm or claims did not verify
    InvalidToken,

    /// Token verified but `exp` is in the past
    ExpiredToken,

    /// Token verified but carries no `sub`
    MissingSubject,

    /// The request names an email other than the token's `email` claim
    EmailMismatch,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Clients only distinguish "no token" from "bad token".
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Access token is required"),
            AuthError::InvalidToken | AuthError::ExpiredToken | AuthError::MissingSubject => {
                (StatusCode::UNAUTHORIZED, "Invalid token")
            }
            AuthError::EmailMismatch => (StatusCode::FORBIDDEN, "Email does not match token"),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Missing access token"),
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::ExpiredToken => write!(f, "Token has expired"),
            AuthError::MissingSubject => write!(f, "Token has no subject"),
            AuthError::EmailMismatch => write!(f, "Email does not match token"),
        }
    }
}

impl std::error::Error for AuthError {}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: AuthError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_missing_token_response() {
        let (status, body) = body_of(AuthError::MissingToken).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Access token is required");
    }

    #[tokio::test]
    async fn test_expired_token_looks_invalid() {
        let (status, body) = body_of(AuthError::ExpiredToken).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid token");
    }

    #[tokio::test]
    async fn test_email_mismatch_is_forbidden() {
        let (status, body) = body_of(AuthError::EmailMismatch).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Email does not match token");
    }
}
