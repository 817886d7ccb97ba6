//! Progress event taxonomy and publish/subscribe channel.

use std::collections::HashMap;
use std::sync::Arc;

use entityscan_models::VideoId;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

/// One progress observation for a job, emitted by the Stage Driver
///. Consumers (the façade's `get_status`, debug logging)
/// subscribe to these rather than polling the state store at high
/// frequency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    StageStarted { stage: String },
    StageProgress { stage: String, progress: u8 },
    FrameProcessed { frame_index: u32, total_frames: Option<u32> },
    Completed,
    Failed { error: String },
}

/// Broadcasts [`ProgressEvent`]s per job over an in-process channel. The
/// Stage Driver's own debounce governs how often events are published here;
/// this channel itself applies no further throttling.
#[derive(Clone, Default)]
pub struct ProgressChannel {
    senders: Arc<RwLock<HashMap<VideoId, broadcast::Sender<ProgressEvent>>>>,
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sender_for(&self, video_id: &VideoId) -> broadcast::Sender<ProgressEvent> {
        if let Some(sender) = self.senders.read().await.get(video_id) {
            return sender.clone();
        }
        let mut senders = self.senders.write().await;
        senders
            .entry(video_id.clone())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    /// Publish an event. No-op (not an error) if nobody is subscribed.
    pub async fn publish(&self, video_id: &VideoId, event: ProgressEvent) {
        let sender = self.sender_for(video_id).await;
        let _ = sender.send(event);
    }

    /// Subscribe to a job's progress stream.
    pub async fn subscribe(&self, video_id: &VideoId) -> broadcast::Receiver<ProgressEvent> {
        self.sender_for(video_id).await.subscribe()
    }

    /// Drop the channel for a job once terminal, freeing the map entry.
    pub async fn retire(&self, video_id: &VideoId) {
        self.senders.write().await.remove(video_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_observes_published_events() {
        let channel = ProgressChannel::new();
        let video_id = VideoId::from("abcd1234");
        let mut rx = channel.subscribe(&video_id).await;

        channel
            .publish(&video_id, ProgressEvent::StageStarted { stage: "extracting_frames".into() })
            .await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ProgressEvent::StageStarted { stage } if stage == "extracting_frames"));
    }

    #[tokio::test]
    async fn publish_without_subscriber_does_not_error() {
        let channel = ProgressChannel::new();
        let video_id = VideoId::from("abcd1234");
        channel.publish(&video_id, ProgressEvent::Completed).await;
    }

    #[tokio::test]
    async fn retire_removes_the_channel_entry() {
        let channel = ProgressChannel::new();
        let video_id = VideoId::from("abcd1234");
        let _rx = channel.subscribe(&video_id).await;
        channel.retire(&video_id).await;
        assert!(channel.senders.read().await.get(&video_id).is_none());
    }
}
