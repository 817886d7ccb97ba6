//! Detector capability interfaces.
//!
//! The core treats every external model as a capability behind a narrow
//! trait. Each concrete adapter may fail `Unavailable` only at
//! construction time (missing binary, missing model weights); the Stage
//! Driver's `CapabilityTable` (`entityscan-worker`) holds `Option<Arc<dyn
//! Trait>>` per capability and treats a missing one as "skip this source"
//! rather than failing the job.
//!
//! Every trait here is `Send + Sync` and object-safe so a worker can hold
//! `Option<Arc<dyn Trait>>` per capability in a single table built once at
//! startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use entityscan_models::{Detection, Transcript};

use crate::error::MediaResult;

/// One sampled still image produced by a [`FrameExtractor`], before any
/// detector has run over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFrame {
    pub index: u32,
    pub timestamp_sec: f64,
    pub path: PathBuf,
}

/// `FrameExtractor(path, intervalSec, smartSampling) -> stream of Frame
/// records`. Fails with `ExtractionFailed` only when
/// the concrete implementation has exhausted both its primary and
/// fallback codec paths and produced zero frames.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract(
        &self,
        video_path: &Path,
        interval_sec: u32,
        smart_sampling: bool,
        out_dir: &Path,
    ) -> MediaResult<Vec<ExtractedFrame>>;
}

/// `ObjectDetector(frame) -> list of Detection{..., source="yolo"}`
///. Must never raise on a decodable frame; an empty
/// `Vec` is a valid, non-error result.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    async fn detect(&self, frame_path: &Path) -> MediaResult<Vec<Detection>>;
}

/// One phrase `CaptionDiscovery` proposes for a frame, before verification.
#[derive(Debug, Clone)]
pub struct DiscoveryCandidate {
    pub label: String,
    pub score: f32,
}

/// `CaptionDiscovery(frame) -> list of candidate labels with a per-label
/// score`. Generic-phrase filtering (§4.4) happens in the
/// Detector Fusion stage, not here; this trait only proposes candidates.
#[async_trait]
pub trait CaptionDiscovery: Send + Sync {
    async fn discover(&self, frame_path: &Path) -> MediaResult<Vec<DiscoveryCandidate>>;
}

/// `OpenVocabScorer(frame, labels) -> map label -> score`.
/// Used both for `source="open_vocab"` detection and for
/// `source="verify"` re-scoring of discovery candidates: callers choose which label set to pass.
#[async_trait]
pub trait OpenVocabScorer: Send + Sync {
    async fn score(&self, frame_path: &Path, labels: &[String]) -> MediaResult<BTreeMap<String, f32>>;
}

/// `OcrReader(frame) -> list of Detection{label=normalized_text, ...,
/// source="ocr"}`. `conf` is vendor-reported confidence
/// normalized to `[0, 1]` by the implementation before it reaches this
/// trait's caller.
#[async_trait]
pub trait OcrReader: Send + Sync {
    async fn read(&self, frame_path: &Path) -> MediaResult<Vec<Detection>>;
}

/// `Transcriber(videoPath) -> {language, text, segments[],
/// audio_analysis{...}}`. Per spec this capability "always
/// returns a value" — a transcription failure mid-call is recorded on
/// `Transcript::error` by the caller (the `transcribing_audio` stage),
/// not surfaced as an `Err` here unless the capability itself is
/// `Unavailable` at construction.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, video_path: &Path) -> MediaResult<Transcript>;
}

/// `Embedder(text) -> fixed-length vector`. Optional; the
/// Search Indexer degrades to Jaccard overlap when no `Embedder` is
/// configured.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> MediaResult<Vec<f32>>;

    /// Dimensionality of vectors this embedder returns, used by callers
    /// that pre-allocate or validate shape without awaiting a call.
    fn dimensions(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoEmbedder;

    #[async_trait]
    impl Embedder for EchoEmbedder {
        async fn embed(&self, text: &str) -> MediaResult<Vec<f32>> {
            Ok(vec![text.len() as f32])
        }

        fn dimensions(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn embedder_trait_is_object_safe_and_callable() {
        let embedder: Box<dyn Embedder> = Box::new(EchoEmbedder);
        let vector = embedder.embed("aircraft").await.unwrap();
        assert_eq!(vector, vec![8.0]);
        assert_eq!(embedder.dimensions(), 1);
    }
}
