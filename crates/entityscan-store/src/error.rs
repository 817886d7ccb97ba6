//! State store error types.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("illegal status transition {from} -> {to} for job {video_id}")]
    IllegalTransition {
        video_id: String,
        from: String,
        to: String,
    },

    #[error("job {0} is not in a terminal state and is not past its stale timeout")]
    DeleteNotPermitted(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
