//! Shared data model for the entity ingestion pipeline.
//!
//! This crate provides the Serde-serializable types that every other
//! crate in the workspace builds on top of:
//! - Job records and the status transition DAG (job.rs)
//! - Frames and the detections attached to them (frame.rs, detection.rs)
//! - Per-label aggregation output (entity_summary.rs)
//! - The canonical Report artifact (report.rs)
//! - The rebuildable Search Index row shape (search_index.rs)
//! - Worker-wide configuration (config.rs)
//! - The pipeline error taxonomy (error.rs)

pub mod config;
pub mod detection;
pub mod entity_summary;
pub mod error;
pub mod frame;
pub mod ids;
pub mod job;
pub mod report;
pub mod search_index;
pub mod timestamp;

pub use config::{DetectorConfig, PipelineConfig};
pub use detection::{normalize_label, BoundingBox, Detection, Source};
pub use entity_summary::{EntitySummary, TimeRange};
pub use error::{PipelineError, PipelineResult};
pub use frame::Frame;
pub use ids::VideoId;
pub use job::{clamp_interval_sec, Job, JobStatus};
pub use report::{AudioAnalysis, Report, Transcript, TranscriptSegment};
pub use search_index::{
    MatchedEntity, SearchIndexRow, SearchJobHit, SearchResponse, SimilarEntity,
};
pub use timestamp::{format_mm_ss, round4, round_seconds};
