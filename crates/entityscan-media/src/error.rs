//! Error types for media and detector-capability operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during frame extraction, fetching, or a
/// detector-capability call.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("download failed: {message}")]
    DownloadFailed { message: String },

    /// Both the primary and fallback codec paths produced zero frames.
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("invalid video file: {0}")]
    InvalidVideo(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A capability's backing binary/model weights are missing. Raised at
    /// construction time only; never mid-job.
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// A capability raised on a specific, decodable frame. Non-fatal
    /// unless it occurs on every frame for a mandatory source.
    #[error("capability runtime error: {0}")]
    CapabilityRuntimeError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<MediaError> for entityscan_models::PipelineError {
    fn from(err: MediaError) -> Self {
        use entityscan_models::PipelineError;
        match err {
            MediaError::CapabilityUnavailable(msg) => PipelineError::CapabilityUnavailable(msg),
            MediaError::ExtractionFailed(msg) => PipelineError::ExtractionFailed(msg),
            MediaError::CapabilityRuntimeError(msg) => PipelineError::CapabilityRuntimeError {
                source: "media".to_string(),
                message: msg,
            },
            MediaError::FileNotFound(_) | MediaError::InvalidVideo(_) | MediaError::UnsupportedFormat(_) => {
                PipelineError::InputInvalid(err.to_string())
            }
            MediaError::Cancelled => PipelineError::Cancelled,
            MediaError::Io(e) => PipelineError::Io(e),
            MediaError::JsonParse(e) => PipelineError::Json(e),
            // Every remaining variant (FFmpeg/FFprobe/yt-dlp failures,
            // timeouts) only ever bubbles out of the extraction stage, so
            // it is treated as a fatal extraction failure.
            other => PipelineError::ExtractionFailed(other.to_string()),
        }
    }
}
