//! Bearer token authentication for REST routes and the chat socket.

mod error;
mod jwt;

pub use error::AuthError;
pub use jwt::{JwtClaims, JwtValidator};

/// Identity attached to authenticated requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Supabase user id (`sub` claim).
    pub user_id: String,
    pub email: Option<String>,
}

impl AuthenticatedUser {
    /// Reject requests that act on another user's email.
    pub fn authorize_email(&self, requested: &str) -> Result<(), AuthError> {
        authorize_email(self.email.as_deref(), requested)
    }
}

impl From<JwtClaims> for AuthenticatedUser {
    fn from(claims: JwtClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
        }
    }
}

/// A requested email must match the token's `email` claim, ignoring ASCII
/// case. Tokens without the claim cannot be checked and are let through.
pub fn authorize_email(claim: Option<&str>, requested: &str) -> Result<(), AuthError> {
    match claim.filter(|c| !c.is_empty()) {
        Some(claim) if !claim.eq_ignore_ascii_case(requested.trim()) => {
            Err(AuthError::EmailMismatch)
        }
        _ => Ok(()),
    }
}

/// Strip an optional `Bearer ` prefix (case-insensitive) from a token value.
pub fn strip_bearer(value: &str) -> &str {
    let value = value.trim();
    match value.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => value[7..].trim_start(),
        _ => value,
    }
}

/// Pull the token out of an `Authorization` header. The header must use the
/// `Bearer` scheme.
pub fn bearer_from_headers(headers: &http::HeaderMap) -> Option<&str> {
    let value = headers
        .get(http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .trim();
    let token = strip_bearer(value);
    (token.len() < value.len() && !token.is_empty()).then_some(token)
}
