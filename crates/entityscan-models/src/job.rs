//! Job record and status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::VideoId;

/// Job processing status. Transitions form the DAG
/// `Queued -> Processing -> {Completed, Failed}`; no other transition is
/// legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether no further status mutation is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether transitioning from `self` to `next` is a legal edge of the
    /// status DAG.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                // Crash recovery resets a stale `processing` job back to `queued`
                //; this is the only backward edge.
                | (JobStatus::Processing, JobStatus::Queued)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A submitted video and all state the pipeline has accumulated about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub video_id: VideoId,
    pub filename: String,
    pub interval_sec: u32,
    pub voice_file: Option<String>,
    pub status: JobStatus,
    /// 0..=100, non-decreasing within a job until terminal state.
    pub progress: u8,
    pub current_stage: Option<String>,
    pub duration_sec: Option<f64>,
    pub frames_analyzed: u32,
    pub unique_entities: u32,
    /// JSON-serialized entity summary map (the `entities` field of the
    /// Report), kept on the job record for quick status display without a
    /// second read of the report artifact.
    pub entities_json: Option<serde_json::Value>,
    pub video_path: Option<String>,
    pub frames_dir: Option<String>,
    pub report_path: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Monotonically increasing per-job counter, bumped on every mutation.
    /// Lets a poller detect "something changed" without relying on
    /// wall-clock resolution; carries no cross-job ordering guarantee.
    pub event_seq: u64,
}

/// Clamp a sampling interval to the spec's floor of 1 second.
pub fn clamp_interval_sec(requested: Option<u32>) -> u32 {
    requested.unwrap_or(5).max(1)
}

impl Job {
    pub fn new(filename: impl Into<String>, interval_sec: Option<u32>, voice_file: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            video_id: VideoId::new(),
            filename: filename.into(),
            interval_sec: clamp_interval_sec(interval_sec),
            voice_file,
            status: JobStatus::Queued,
            progress: 0,
            current_stage: None,
            duration_sec: None,
            frames_analyzed: 0,
            unique_entities: 0,
            entities_json: None,
            video_path: None,
            frames_dir: None,
            report_path: None,
            error: None,
            created_at: now,
            updated_at: now,
            event_seq: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_forward_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn illegal_transitions_rejected() {
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn crash_recovery_allows_processing_back_to_queued() {
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn interval_is_clamped_to_at_least_one_second() {
        assert_eq!(clamp_interval_sec(Some(0)), 1);
        assert_eq!(clamp_interval_sec(None), 5);
        assert_eq!(clamp_interval_sec(Some(10)), 10);
    }

    #[test]
    fn new_job_starts_queued_with_zero_progress() {
        let job = Job::new("video.mp4", None, None);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert!(!job.is_terminal());
    }
}
