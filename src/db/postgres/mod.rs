mod documents;
mod messages;
mod waitlist;

pub use documents::PostgresDocumentRepo;
pub use messages::PostgresMessageRepo;
pub use waitlist::PostgresWaitlistRepo;

use crate::db::error::DbError;

/// Map a unique-constraint violation to `Conflict`, passing other errors through.
fn map_unique_violation(err: sqlx::Error, message: &str) -> DbError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            DbError::Conflict(message.to_string())
        }
        _ => DbError::Sqlx(err),
    }
}
