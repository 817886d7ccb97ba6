//! Worker error types: composes the lower crates' errors into one type
//! via `#[from]`, with a fatal/non-fatal classification used by the
//! stage driver to decide whether a stage failure should fail the job.

use thiserror::Error;

use entityscan_models::PipelineError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("store error: {0}")]
    Store(#[from] entityscan_store::StoreError),

    #[error("media error: {0}")]
    Media(#[from] entityscan_media::MediaError),

    #[error("queue error: {0}")]
    Queue(#[from] entityscan_queue::QueueError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    /// Whether the job record should transition to `failed` for this
    /// error, vs. being recorded and absorbed at the point it occurred.
    pub fn is_fatal(&self) -> bool {
        match self {
            WorkerError::Pipeline(e) => e.is_fatal(),
            WorkerError::Media(entityscan_media::MediaError::CapabilityUnavailable(_)) => false,
            _ => true,
        }
    }

    /// The `error` string persisted verbatim on the job record when fatal.
    pub fn status_text(&self) -> String {
        match self {
            WorkerError::Pipeline(e) => e.status_text(),
            other => other.to_string(),
        }
    }
}
