//! Document upload, listing, download links and deletion.
//!
//! Uploads happen in two steps: the client asks for presigned PUT URLs, sends
//! the files straight to object storage, then confirms. Confirmed documents
//! are indexed in the background.

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::ApiError;
use crate::{
    AppState,
    models::{Document, UploadConfirmation, UploadFile, UploadTicket},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/request-upload", post(request_upload))
        .route("/confirm-upload", post(confirm_upload))
        .route("/get-documents-by-email", get(get_documents_by_email))
        .route("/get-document-access-link", get(get_document_access_link))
        .route("/delete-document-by-s3-key", delete(delete_document_by_s3_key))
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestUploadBody {
    #[serde(default)]
    pub files: Vec<UploadFile>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestUploadResponse {
    pub uploads: Vec<UploadTicket>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmUploadBody {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub documents: Vec<UploadConfirmation>,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3KeyQuery {
    pub s3_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuery {
    pub s3_key: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLinkResponse {
    pub presigned_url: String,
}

/// Treat empty strings like missing values.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

#[tracing::instrument(name = "documents.request_upload", skip(state, body))]
pub async fn request_upload(
    State(state): State<AppState>,
    body: Result<Json<RequestUploadBody>, JsonRejection>,
) -> Result<Json<RequestUploadResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    if body.files.is_empty() {
        return Err(ApiError::bad_request("No files specified"));
    }
    let email = non_empty(body.email).ok_or_else(|| ApiError::bad_request("Email is required"))?;

    let uploads = state
        .services
        .documents
        .request_uploads(&email, &body.files)
        .await
        .map_err(|e| ApiError::internal("Failed to process upload request", e))?;

    tracing::info!(email = %email, count = uploads.len(), "Upload request processed");
    Ok(Json(RequestUploadResponse { uploads }))
}

#[tracing::instrument(name = "documents.confirm_upload", skip(state, body))]
pub async fn confirm_upload(
    State(state): State<AppState>,
    body: Result<Json<ConfirmUploadBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let email = non_empty(body.email).ok_or_else(|| ApiError::bad_request("Email is required"))?;
    if body.documents.is_empty() {
        return Err(ApiError::bad_request("No documents specified"));
    }

    let completed = state
        .services
        .documents
        .process_upload_completion(&email, body.documents)
        .await
        .map_err(|e| ApiError::internal("Failed to process upload completion", e))?;

    for document in completed {
        state
            .services
            .ingestion
            .schedule(&state.task_tracker, document);
    }

    Ok(message("Upload completion processed successfully"))
}

#[tracing::instrument(name = "documents.list", skip(state))]
pub async fn get_documents_by_email(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let email = non_empty(query.email).ok_or_else(|| ApiError::bad_request("Email is required"))?;

    let documents = state
        .services
        .documents
        .list_by_email(&email)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch documents", e))?;

    tracing::info!(email = %email, count = documents.len(), "Documents fetched");
    Ok(Json(documents))
}

#[tracing::instrument(name = "documents.access_link", skip(state))]
pub async fn get_document_access_link(
    State(state): State<AppState>,
    Query(query): Query<S3KeyQuery>,
) -> Result<Json<AccessLinkResponse>, ApiError> {
    let s3_key =
        non_empty(query.s3_key).ok_or_else(|| ApiError::bad_request("Valid s3Key is required"))?;

    let presigned_url = state
        .services
        .documents
        .access_link(&s3_key)
        .await
        .map_err(|e| ApiError::internal("Failed to generate document access link", e))?;

    Ok(Json(AccessLinkResponse { presigned_url }))
}

#[tracing::instrument(name = "documents.delete", skip(state))]
pub async fn delete_document_by_s3_key(
    State(state): State<AppState>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<Value>, ApiError> {
    let (Some(s3_key), Some(email)) = (non_empty(query.s3_key), non_empty(query.email)) else {
        return Err(ApiError::bad_request("Valid s3Key and email are required"));
    };

    let deleted = state
        .services
        .documents
        .delete_by_s3_key(&email, &s3_key)
        .await
        .map_err(|e| ApiError::internal("Failed to delete document", e))?;

    if !deleted {
        return Err(ApiError::not_found("Document not found"));
    }
    Ok(message("Document deleted successfully"))
}
