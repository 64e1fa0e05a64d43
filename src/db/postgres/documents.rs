use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::map_unique_violation;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::DocumentRepo,
    },
    models::{CreateDocument, Document, UploadStatus},
};

pub struct PostgresDocumentRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresDocumentRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        Self {
            read_pool: read_pool.unwrap_or_else(|| write_pool.clone()),
            write_pool,
        }
    }

    fn document_from_row(row: &PgRow) -> DbResult<Document> {
        let status_str: String = row.get("upload_status");

        Ok(Document {
            id: row.get("id"),
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
impl DocumentRepo for PostgresDocumentRepo {
    async fn create(&self, input: CreateDocument) -> DbResult<Document> {
        let row = sqlx::query(
            r#"
            INSERT INTO documents (id, user_email, filename, s3_key, file_size, file_type, upload_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_email, filename, s3_key, file_size, file_type, upload_status, error, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.user_email)
        .bind(&input.filename)
        .bind(&input.s3_key)
        .bind(input.file_size)
        .bind(&input.file_type)
        .bind(UploadStatus::Pending.as_str())
        .fetch_one(&self.write_pool)
        .await
        .map_err(|e| map_unique_violation(e, "A document with this key already exists"))?;

        Self::document_from_row(&row)
    }

    async fn get(&self, id: Uuid) -> DbResult<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_email, filename, s3_key, file_size, file_type, upload_status, error, created_at, updated_at
            FROM documents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.read_pool)
        .await?;

        row.as_ref().map(Self::document_from_row).transpose()
    }

    async fn get_by_s3_key(&self, user_email: &str, s3_key: &str) -> DbResult<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_email, filename, s3_key, file_size, file_type, upload_status, error, created_at, updated_at
            FROM documents
            WHERE user_email = $1 AND s3_key = $2
            "#,
        )
        .bind(user_email)
        .bind(s3_key)
        .fetch_optional(&self.read_pool)
        .await?;

        row.as_ref().map(Self::document_from_row).transpose()
    }

    async fn list_by_email(&self, user_email: &str) -> DbResult<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_email, filename, s3_key, file_size, file_type, upload_status, error, created_at, updated_at
            FROM documents
            WHERE user_email = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_email)
        .fetch_all(&self.read_pool)
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
            SET upload_status = $1, error = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(id)
        .execute(&self.write_pool)
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
            SET upload_status = $1, error = $2, updated_at = NOW()
            WHERE id = $3 AND user_email = $4
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(id)
        .bind(user_email)
        .execute(&self.write_pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_s3_key(&self, user_email: &str, s3_key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE user_email = $1 AND s3_key = $2")
            .bind(user_email)
            .bind(s3_key)
            .execute(&self.write_pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
