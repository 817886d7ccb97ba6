//! The unit of work a [`crate::Broker`] carries: one job's video_id.

use entityscan_models::VideoId;
use serde::{Deserialize, Serialize};

/// A task enqueued by `create_job` and picked up by a worker. The job record
/// itself lives in the state store; the task only carries enough to look
/// it up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub video_id: VideoId,
}

impl Task {
    pub fn new(video_id: VideoId) -> Self {
        Self { video_id }
    }

    /// The dedup/idempotency key a broker may use to collapse duplicate
    /// enqueues of the same job.
    pub fn idempotency_key(&self) -> String {
        self.video_id.to_string()
    }
}

/// A task handed to a worker, carrying enough broker-specific context to
/// acknowledge or retry it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub task: Task,
    /// Opaque broker-assigned identifier (Redis Streams message ID, or a
    /// synthetic counter for the in-process broker).
    pub delivery_id: String,
    /// Number of times this task has been delivered, including this one.
    pub delivery_count: u32,
}
