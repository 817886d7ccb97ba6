//! The set of detector capabilities a worker was able to construct at
//! startup.
//!
//! A missing optional capability is `None`; fusion treats that the same
//! way as a source that is simply disabled in config. The frame
//! extractor is the one mandatory capability: without it the worker
//! cannot run any job, so construction failure there is fatal at
//! startup rather than degrading per-job.

use std::sync::Arc;

use entityscan_media::{
    CaptionDiscovery, Embedder, FrameExtractor, ObjectDetector, OcrReader, OpenVocabScorer,
    Transcriber,
};

/// Built once per worker process. Each `None` entry is logged once at
/// construction and thereafter treated
/// as "skip this source" by [`crate::fusion::Fusion`].
pub struct CapabilityTable {
    pub frame_extractor: Arc<dyn FrameExtractor>,
    pub object_detector: Option<Arc<dyn ObjectDetector>>,
    pub caption_discovery: Option<Arc<dyn CaptionDiscovery>>,
    pub open_vocab_scorer: Option<Arc<dyn OpenVocabScorer>>,
    pub ocr_reader: Option<Arc<dyn OcrReader>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub embedder: Option<Arc<dyn Embedder>>,
}

impl CapabilityTable {
    pub fn new(frame_extractor: Arc<dyn FrameExtractor>) -> Self {
        Self {
            frame_extractor,
            object_detector: None,
            caption_discovery: None,
            open_vocab_scorer: None,
            ocr_reader: None,
            transcriber: None,
            embedder: None,
        }
    }

    pub fn with_object_detector(mut self, detector: Option<Arc<dyn ObjectDetector>>) -> Self {
        self.log_missing("object_detector (yolo)", detector.is_none());
        self.object_detector = detector;
        self
    }

    pub fn with_caption_discovery(mut self, discovery: Option<Arc<dyn CaptionDiscovery>>) -> Self {
        self.log_missing("caption_discovery", discovery.is_none());
        self.caption_discovery = discovery;
        self
    }

    pub fn with_open_vocab_scorer(mut self, scorer: Option<Arc<dyn OpenVocabScorer>>) -> Self {
        self.log_missing("open_vocab_scorer", scorer.is_none());
        self.open_vocab_scorer = scorer;
        self
    }

    pub fn with_ocr_reader(mut self, reader: Option<Arc<dyn OcrReader>>) -> Self {
        self.log_missing("ocr_reader", reader.is_none());
        self.ocr_reader = reader;
        self
    }

    pub fn with_transcriber(mut self, transcriber: Option<Arc<dyn Transcriber>>) -> Self {
        self.log_missing("transcriber", transcriber.is_none());
        self.transcriber = transcriber;
        self
    }

    pub fn with_embedder(mut self, embedder: Option<Arc<dyn Embedder>>) -> Self {
        self.log_missing("embedder", embedder.is_none());
        self.embedder = embedder;
        self
    }

    fn log_missing(&self, capability: &str, missing: bool) {
        if missing {
            tracing::warn!(capability, "capability unavailable at worker startup, will be skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use entityscan_media::{ExtractedFrame, MediaResult};
    use std::path::Path;

    struct NullExtractor;

    #[async_trait]
    impl FrameExtractor for NullExtractor {
        async fn extract(
            &self,
            _video_path: &Path,
            _interval_sec: u32,
            _smart_sampling: bool,
            _out_dir: &Path,
        ) -> MediaResult<Vec<ExtractedFrame>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn missing_optional_capabilities_are_none_by_default() {
        let table = CapabilityTable::new(Arc::new(NullExtractor));
        assert!(table.object_detector.is_none());
        assert!(table.embedder.is_none());
    }
}
