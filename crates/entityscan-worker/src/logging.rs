//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for job processing with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};

use entityscan_models::VideoId;

/// Job logger for structured logging with consistent formatting.
///
/// Provides a simple interface for logging job lifecycle events
/// with automatic contextual information (video ID, current stage).
#[derive(Debug, Clone)]
pub struct JobLogger {
    video_id: String,
    stage: String,
}

impl JobLogger {
    /// Create a new job logger for a specific job and stage.
    pub fn new(video_id: &VideoId, stage: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            stage: stage.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(video_id = %self.video_id, stage = %self.stage, "stage started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(video_id = %self.video_id, stage = %self.stage, "stage progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(video_id = %self.video_id, stage = %self.stage, "stage warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(video_id = %self.video_id, stage = %self.stage, "stage error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(video_id = %self.video_id, stage = %self.stage, "stage completed: {}", message);
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Create a tracing span for this job's current stage.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job_stage", video_id = %self.video_id, stage = %self.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logger_carries_video_id_and_stage() {
        let video_id = VideoId::from("abcd1234");
        let logger = JobLogger::new(&video_id, "extracting_frames");

        assert_eq!(logger.video_id(), "abcd1234");
        assert_eq!(logger.stage(), "extracting_frames");
    }
}
