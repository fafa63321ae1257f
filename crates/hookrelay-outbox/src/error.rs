//! Error types for the outbox crate.

use thiserror::Error;

/// Errors that can occur in outbox operations.
#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("Database error: {0}")]
    Database(#[from] hookrelay_database::DatabaseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid target URL: {0}")]
    InvalidTargetUrl(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type OutboxResult<T> = Result<T, OutboxError>;
