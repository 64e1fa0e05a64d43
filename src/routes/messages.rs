use axum::{
    Json, Router,
    extract::{Extension, Query, State},
    routing::get,
};
use serde::Deserialize;

use super::ApiError;
use crate::{AppState, auth::AuthenticatedUser, models::ChatMessage};

/// Mounted behind the bearer-token middleware.
pub fn router() -> Router<AppState> {
    Router::new().route("/fetch-all-messages", get(fetch_all_messages))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub email: Option<String>,
    pub s3_key: Option<String>,
}

#[tracing::instrument(name = "messages.fetch_all", skip(state, user))]
pub async fn fetch_all_messages(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let email = query
        .email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::bad_request("Email is required"))?;
    let s3_key = query
        .s3_key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::bad_request("s3Key is required"))?;
    user.authorize_email(&email).map_err(|e| {
        tracing::warn!(user_id = %user.user_id, "Rejected message history for another email");
        ApiError::Forbidden(e.to_string())
    })?;

    let messages = state
        .services
        .messages
        .get_all(&email, &s3_key)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch messages", e))?;

    tracing::info!(count = messages.len(), "Messages fetched");
    Ok(Json(messages))
}
