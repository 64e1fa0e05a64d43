use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    auth::{AuthError, AuthenticatedUser, bearer_from_headers},
};

/// Require a valid bearer token. The verified identity is stored in request
/// extensions as [`AuthenticatedUser`].
pub async fn require_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_from_headers(req.headers()).ok_or(AuthError::MissingToken)?;

    let claims = state.jwt.validate(token).map_err(|e| {
        tracing::debug!(error = %e, path = %req.uri().path(), "Rejected bearer token");
        e
    })?;

    req.extensions_mut().insert(AuthenticatedUser::from(claims));
    Ok(next.run(req).await)
}
