//! Typed error type for the db crate.

use engine::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("no database_url configured")]
    MissingDatabaseUrl,

    /// A stored value doesn't map back onto the domain model.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<DbError> for ClientError {
    fn from(err: DbError) -> Self {
        ClientError::Backend(Box::new(err))
    }
}
