use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use serde_json::{Value, json};
use validator::Validate;

use super::ApiError;
use crate::{
    AppState,
    db::DbError,
    models::{CreateWaitlistEntry, WaitlistEntry},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/submit", post(submit_entry))
        .route("/", get(list_entries))
}

#[tracing::instrument(name = "waitlist.submit", skip(state, body))]
pub async fn submit_entry(
    State(state): State<AppState>,
    body: Result<Json<CreateWaitlistEntry>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(entry) = body.map_err(|e| ApiError::Validation {
        message: "Invalid request body".to_string(),
        details: json!({ "body": [e.body_text()] }),
    })?;
    entry.validate().map_err(|e| {
        tracing::debug!(errors = %e, "Rejected waitlist entry");
        ApiError::invalid_body(&e)
    })?;

    let entry = match state.services.waitlist.submit(entry).await {
        Ok(entry) => entry,
        Err(DbError::Conflict(msg)) => return Err(ApiError::Conflict(msg)),
        Err(e) => return Err(ApiError::internal("Failed to submit waitlist entry", e)),
    };

    tracing::info!(email = %entry.email, "Waitlist entry submitted");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "entry": entry })),
    ))
}

#[tracing::instrument(name = "waitlist.list", skip(state))]
pub async fn list_entries(
    State(state): State<AppState>,
) -> Result<Json<Vec<WaitlistEntry>>, ApiError> {
    let entries = state
        .services
        .waitlist
        .list_all()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch waitlist entries", e))?;
    Ok(Json(entries))
}
