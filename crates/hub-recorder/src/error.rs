//! Error types for durable storage

use thiserror::Error;

/// Result type for recorder operations
pub type RecorderResult<T> = Result<T, RecorderError>;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database connection lock poisoned")]
    Poisoned,

    #[error("invalid row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },

    #[error("unknown migration version: {0}")]
    UnknownMigration(i32),
}
