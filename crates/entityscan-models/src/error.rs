//! Pipeline-wide error taxonomy.
//!
//! One per-crate `thiserror` enum per failure domain (`MediaError`,
//! `WorkerError`, `QueueError`), classified by *kind* here with an
//! explicit fatal/non-fatal split the Stage Driver consults instead of
//! re-deriving it from the error message.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input invalid: {0}")]
    InputInvalid(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("capability runtime error on {source}: {message}")]
    CapabilityRuntimeError { source: String, message: String },

    #[error("transcript error: {0}")]
    TranscriptError(String),

    #[error("stage timeout: {0}")]
    StageTimeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("persistence error: {0}")]
    PersistenceError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether this error is fatal to the job (must transition it to
    /// `failed`) versus recoverable at the point it was raised.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PipelineError::CapabilityUnavailable(_) | PipelineError::TranscriptError(_)
        )
    }

    /// The `error` string persisted verbatim on the job record when fatal.
    /// For `Cancelled` this is always exactly `"cancelled"`.
    pub fn status_text(&self) -> String {
        match self {
            PipelineError::Cancelled => "cancelled".to_string(),
            PipelineError::StageTimeout(stage) => format!("stage_timeout:{stage}"),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_unavailable_is_non_fatal() {
        assert!(!PipelineError::CapabilityUnavailable("open_vocab".into()).is_fatal());
    }

    #[test]
    fn extraction_failed_is_fatal() {
        assert!(PipelineError::ExtractionFailed("zero frames".into()).is_fatal());
    }

    #[test]
    fn cancelled_status_text_is_literal() {
        assert_eq!(PipelineError::Cancelled.status_text(), "cancelled");
    }

    #[test]
    fn stage_timeout_status_text_names_the_stage() {
        let err = PipelineError::StageTimeout("detecting_entities".into());
        assert_eq!(err.status_text(), "stage_timeout:detecting_entities");
    }
}
