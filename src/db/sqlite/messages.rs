use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{error::DbResult, repos::MessageRepo},
    models::{CreateMessage, StoredMessage},
};

pub struct SqliteMessageRepo {
    pool: SqlitePool,
}

impl SqliteMessageRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn message_from_row(row: &SqliteRow) -> DbResult<StoredMessage> {
        Ok(StoredMessage {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            user_email: row.get("user_email"),
            s3_key: row.get("s3_key"),
            content: row.get("content"),
            is_user_message: row.get("is_user_message"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl MessageRepo for SqliteMessageRepo {
    async fn create_many(&self, messages: Vec<CreateMessage>) -> DbResult<Vec<StoredMessage>> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(messages.len());

        for msg in messages {
            let id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO messages (id, user_email, s3_key, content, is_user_message, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id.to_string())
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
            WHERE user_email = ? AND s3_key = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_email)
        .bind(s3_key)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::message_from_row).collect()
    }

    async fn delete_for_document(&self, user_email: &str, s3_key: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE user_email = ? AND s3_key = ?")
            .bind(user_email)
            .bind(s3_key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
