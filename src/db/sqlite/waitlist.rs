use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::{map_unique_violation, parse_uuid};
use crate::{
    db::{error::DbResult, repos::WaitlistRepo},
    models::{CreateWaitlistEntry, WaitlistEntry},
};

pub struct SqliteWaitlistRepo {
    pool: SqlitePool,
}

impl SqliteWaitlistRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WaitlistRepo for SqliteWaitlistRepo {
    async fn create(&self, input: CreateWaitlistEntry) -> DbResult<WaitlistEntry> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO waitlist (id, email, name, position, use_case, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.email)
        .bind(&input.name)
        .bind(&input.position)
        .bind(&input.use_case)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "Email is already on the waitlist"))?;

        Ok(WaitlistEntry {
            id,
            email: input.email,
            name: input.name,
            position: input.position,
            use_case: input.use_case,
            created_at: now,
        })
    }

    async fn list(&self) -> DbResult<Vec<WaitlistEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, email, name, position, use_case, created_at
            FROM waitlist
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(WaitlistEntry {
                    id: parse_uuid(&row.get::<String, _>("id"))?,
                    email: row.get("email"),
                    name: row.get("name"),
                    position: row.get("position"),
                    use_case: row.get("use_case"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}
