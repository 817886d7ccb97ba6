//! The canonical, durable Report artifact.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity_summary::EntitySummary;
use crate::ids::VideoId;

/// Per-segment transcript timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_sec: f64,
    pub end_sec: f64,
    pub text: String,
}

/// Coarse audio characteristics reported alongside the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioAnalysis {
    pub speech_ratio: f64,
    pub speech_seconds: f64,
    pub music_detected: bool,
    pub vad_available: bool,
}

/// The companion voice transcript, or the reason it is missing. A
/// `TranscriptError` is recorded here rather than failing the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub language: Option<String>,
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub audio_analysis: Option<AudioAnalysis>,
    pub error: Option<String>,
}

impl Transcript {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            language: None,
            text: String::new(),
            segments: Vec::new(),
            audio_analysis: None,
            error: Some(error.into()),
        }
    }
}

/// The canonical, durable per-job artifact. Written once by the Report
/// Assembler, atomically (temp-file + rename).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub video_id: VideoId,
    pub filename: String,
    pub duration_sec: f64,
    pub interval_sec: u32,
    pub frames_analyzed: u32,
    pub unique_entities: u32,
    /// Label -> aggregated evidence. A `BTreeMap` keeps iteration ordered
    /// by label string, matching the aggregator's deterministic tie-break
    /// and the JSON object's key order on serialization.
    pub entities: BTreeMap<String, EntitySummary>,
    pub transcript: Option<Transcript>,
}

impl Report {
    /// Recompute `unique_entities` from the current `entities` map.
    /// Callers that mutate `entities` after construction (e.g. dropping a
    /// label below `confidence_min_score`) must call this before
    /// persisting.
    pub fn recount_unique_entities(&mut self) {
        self.unique_entities = self.entities.len() as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_transcript_carries_no_text_or_segments() {
        let t = Transcript::failed("timeout contacting speech service");
        assert!(t.text.is_empty());
        assert!(t.segments.is_empty());
        assert_eq!(t.error.as_deref(), Some("timeout contacting speech service"));
    }

    #[test]
    fn recount_reflects_entities_map_len() {
        let mut report = Report {
            video_id: VideoId::from("abcd1234"),
            filename: "clip.mp4".to_string(),
            duration_sec: 10.0,
            interval_sec: 5,
            frames_analyzed: 2,
            unique_entities: 99,
            entities: BTreeMap::new(),
            transcript: None,
        };
        report.recount_unique_entities();
        assert_eq!(report.unique_entities, 0);
    }
}
