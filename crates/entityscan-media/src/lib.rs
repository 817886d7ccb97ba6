//! FFmpeg-backed frame extraction and the detector-capability traits.
//!
//! This crate provides:
//! - The `FrameExtractor`, `ObjectDetector`, `CaptionDiscovery`,
//!   `OpenVocabScorer`, `OcrReader`, `Transcriber`, and `Embedder`
//!   capability traits every detection source implements
//! - `FfmpegFrameExtractor`, the concrete primary/fallback + smart-sampling
//!   frame extractor
//! - `fetch::download_video`, the URL submission path's `Fetcher`
//!   collaborator
//! - Type-safe FFmpeg command building and progress parsing shared by the
//!   above

pub mod capability;
pub mod command;
pub mod download;
pub mod error;
pub mod extractor;
pub mod fs_utils;
pub mod probe;
pub mod progress;

pub use capability::{
    CaptionDiscovery, DiscoveryCandidate, Embedder, ExtractedFrame, FrameExtractor, ObjectDetector,
    OcrReader, OpenVocabScorer, Transcriber,
};
pub use command::{FfmpegCommand, FfmpegRunner};
pub use download::{download_video, is_supported_url};
pub use error::{MediaError, MediaResult};
pub use extractor::FfmpegFrameExtractor;
pub use probe::{probe_video, VideoInfo};
pub use progress::{FfmpegProgress, ProgressCallback};
