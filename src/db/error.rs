use thiserror::Error;

/// Failures from the document, message and waitlist stores.
#[derive(Debug, Error)]
pub enum DbError {
    /// `[database]` is missing from the config file.
    #[error("Database not configured")]
    NotConfigured,

    #[error("Not found")]
    NotFound,

    /// A unique column already holds the value, such as an S3 key or a
    /// waitlist email.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DbResult<T> = Result<T, DbError>;
