use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::ApiError;
use crate::{
    AppState,
    services::{StorageError, TiktokError},
};

/// Mounted behind the bearer-token middleware.
pub fn router() -> Router<AppState> {
    Router::new().route("/build-tiktok", get(build_tiktok))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTiktokQuery {
    pub pdf_url: Option<String>,
}

#[tracing::instrument(name = "tiktok.build", skip(state))]
pub async fn build_tiktok(
    State(state): State<AppState>,
    Query(query): Query<BuildTiktokQuery>,
) -> Result<Json<Value>, ApiError> {
    let pdf_url = query
        .pdf_url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("Valid pdfUrl is required"))?;

    let s3_key = match state.services.tiktok.build_from_document(&pdf_url).await {
        Ok(key) => key,
        Err(TiktokError::InvalidUrl(_)) => {
            return Err(ApiError::bad_request("Valid pdfUrl is required"));
        }
        Err(TiktokError::Storage(StorageError::NotFound(_))) => {
            return Err(ApiError::not_found("Document not found"));
        }
        Err(e) => return Err(ApiError::internal("Failed to fetch document", e)),
    };

    Ok(Json(json!({
        "message": "Tiktok build request received",
        "s3Key": s3_key,
    })))
}
