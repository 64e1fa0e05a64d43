use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::{map_unique_violation, parse_uuid};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::DocumentRepo,
    },
    models::{CreateDocument, Document, UploadStatus},
};

pub struct SqliteDocumentRepo {
    pool: SqlitePool,
}

impl SqliteDocumentRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn document_from_row(row: &SqliteRow) -> DbResult<Document> {
        let status_str: String = row.get("upload_status");

        Ok(Document {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            user_email: row.get("user_email"),
            filename: row.get("filename"),
            s3_key: row.get("s3_key"),
            file_size: row.get("file_size"),
            file_type: row.get("file_type"),
            upload_status: status_str
                .parse()
                .map_err(|e: String| DbError::Internal(e))?,
            error: row.get("error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl DocumentRepo for SqliteDocumentRepo {
    async fn create(&self, input: CreateDocument) -> DbResult<Document> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO documents (id, user_email, filename, s3_key, file_size, file_type, upload_status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.user_email)
        .bind(&input.filename)
        .bind(&input.s3_key)
        .bind(input.file_size)
        .bind(&input.file_type)
        .bind(UploadStatus::Pending.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "A document with this key already exists"))?;

        Ok(Document {
            id,
            user_email: input.user_email,
            filename: input.filename,
            s3_key: input.s3_key,
            file_size: input.file_size,
            file_type: input.file_type,
            upload_status: UploadStatus::Pending,
            error: None,
            created_at: now,
            updated_at: None,
        })
    }

    async fn get(&self, id: Uuid) -> DbResult<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_email, filename, s3_key, file_size, file_type, upload_status, error, created_at, updated_at
            FROM documents
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::document_from_row).transpose()
    }

    async fn get_by_s3_key(&self, user_email: &str, s3_key: &str) -> DbResult<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_email, filename, s3_key, file_size, file_type, upload_status, error, created_at, updated_at
            FROM documents
            WHERE user_email = ? AND s3_key = ?
            "#,
        )
        .bind(user_email)
        .bind(s3_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::document_from_row).transpose()
    }

    async fn list_by_email(&self, user_email: &str) -> DbResult<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_email, filename, s3_key, file_size, file_type, upload_status, error, created_at, updated_at
            FROM documents
            WHERE user_email = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_email)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::document_from_row).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: UploadStatus,
        error: Option<&str>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET upload_status = ?, error = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(chrono::Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn update_status_for_owner(
        &self,
        id: Uuid,
        user_email: &str,
        status: UploadStatus,
        error: Option<&str>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET upload_status = ?, error = ?, updated_at = ?
            WHERE id = ? AND user_email = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(chrono::Utc::now())
        .bind(id.to_string())
        .bind(user_email)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_s3_key(&self, user_email: &str, s3_key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE user_email = ? AND s3_key = ?")
            .bind(user_email)
            .bind(s3_key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

