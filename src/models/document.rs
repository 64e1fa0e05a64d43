use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an uploaded document.
///
/// Rows are created `pending` when an upload URL is handed out and move to
/// `completed` or `failed` once the client confirms the upload (or indexing
/// fails).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    #[default]
    Pending,
    /// The browser client reports successful uploads as `success`.
    #[serde(alias = "success")]
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UploadStatus::Pending),
            "completed" | "success" => Ok(UploadStatus::Completed),
            "failed" => Ok(UploadStatus::Failed),
            _ => Err(format!("Invalid upload status: {}", s)),
        }
    }
}

/// A row of the `documents` table. Serialized with the column names the
/// frontend reads directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub user_email: String,
    pub filename: String,
    pub s3_key: String,
    pub file_size: i64,
    pub file_type: String,
    pub upload_status: UploadStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreateDocument {
    pub user_email: String,
    pub filename: String,
    pub s3_key: String,
    pub file_size: i64,
    pub file_type: String,
}

/// One file the client intends to upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFile {
    pub filename: String,
    pub file_type: String,
    #[serde(default)]
    pub size: i64,
}

/// Where and how to upload one file.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    pub document_id: Uuid,
    pub presigned_url: String,
    pub s3_key: String,
}

/// Client-reported outcome of one direct upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfirmation {
    pub document_id: Uuid,
    pub s3_key: String,
    pub status: UploadStatus,
    #[serde(default)]
    pub error: Option<String>,
    /// Opaque client metadata, ignored by the server.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}
