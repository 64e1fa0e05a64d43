use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    db::{error::DbResult, repos::MessageRepo},
    models::{CreateMessage, StoredMessage},
};

pub struct PostgresMessageRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresMessageRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        Self {
            read_pool: read_pool.unwrap_or_else(|| write_pool.clone()),
            write_pool,
        }
    }
}

#[async_trait]
impl MessageRepo for PostgresMessageRepo {
    async fn create_many(&self, messages: Vec<CreateMessage>) -> DbResult<Vec<StoredMessage>> {
        let mut tx = self.write_pool.begin().await?;
        let mut stored = Vec::with_capacity(messages.len());

        for msg in messages {
            let id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO messages (id, user_email, s3_key, content, is_user_message, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(id)
            .bind(&msg.user_email)
            .bind(&msg.s3_key)
            .bind(&msg.content)
            .bind(msg.is_user_message)
            .bind(msg.created_at)
            .execute(&mut *tx)
            .await?;

            stored.push(StoredMessage {
                id,
                user_email: msg.user_email,
                s3_key: msg.s3_key,
                content: msg.content,
                is_user_message: msg.is_user_message,
                created_at: msg.created_at,
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn list_for_document(
        &self,
        user_email: &str,
        s3_key: &str,
    ) -> DbResult<Vec<StoredMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_email, s3_key, content, is_user_message, created_at
            FROM messages
            WHERE user_email = $1 AND s3_key = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_email)
        .bind(s3_key)
        .fetch_all(&self.read_pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| StoredMessage {
                id: row.get("id"),
                user_email: row.get("user_email"),
                s3_key: row.get("s3_key"),
                content: row.get("content"),
                is_user_message: row.get("is_user_message"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn delete_for_document(&self, user_email: &str, s3_key: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE user_email = $1 AND s3_key = $2")
            .bind(user_email)
            .bind(s3_key)
            .execute(&self.write_pool)
            .await?;

        Ok(result.rows_affected())
    }
}
