use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::map_unique_violation;
use crate::{
    db::{error::DbResult, repos::WaitlistRepo},
    models::{CreateWaitlistEntry, WaitlistEntry},
};

pub struct PostgresWaitlistRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresWaitlistRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        Self {
            read_pool: read_pool.unwrap_or_else(|| write_pool.clone()),
            write_pool,
        }
    }

    fn entry_from_row(row: &PgRow) -> WaitlistEntry {
        WaitlistEntry {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            position: row.get("position"),
            use_case: row.get("use_case"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl WaitlistRepo for PostgresWaitlistRepo {
    async fn create(&self, input: CreateWaitlistEntry) -> DbResult<WaitlistEntry> {
        let row = sqlx::query(
            r#"
            INSERT INTO waitlist (id, email, name, position, use_case)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, name, position, use_case, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.email)
        .bind(&input.name)
        .bind(&input.position)
        .bind(&input.use_case)
        .fetch_one(&self.write_pool)
        .await
        .map_err(|e| map_unique_violation(e, "Email is already on the waitlist"))?;

        Ok(Self::entry_from_row(&row))
    }

    async fn list(&self) -> DbResult<Vec<WaitlistEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, email, name, position, use_case, created_at
            FROM waitlist
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.read_pool)
        .await?;

        Ok(rows.iter().map(Self::entry_from_row).collect())
    }
}
