use thiserror::Error;

use crate::{RunId, Sequence};

/// Errors that can occur when interacting with the history store.
#[derive(Debug, Error)]
pub enum HistoryStoreError {
    /// Another writer appended to the run first.
    /// The expected last sequence did not match the stored one.
    #[error("History conflict for run {run_id}: expected sequence {expected}, found {actual}")]
    Conflict {
        run_id: RunId,
        expected: Sequence,
        actual: Sequence,
    },

    /// The records passed to `append` do not form a valid batch.
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// A record was built without one of its required fields.
    #[error("Missing history record field: {0}")]
    MissingField(&'static str),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for history store operations.
pub type Result<T> = std::result::Result<T, HistoryStoreError>;
