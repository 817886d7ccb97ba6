//! Sampled frame records.

use serde::{Deserialize, Serialize};

use crate::detection::Detection;

/// One sampled still image and the detections attached to it during the
/// `detecting_entities` stage. Created during extraction, enriched during
/// detection, never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Dense, 0-based ordinal within the job.
    pub index: u32,
    /// Seconds from the start of the video. For uniform sampling this is
    /// `index * interval_sec`; for smart sampling it is the actual
    /// retained sample's timestamp.
    pub timestamp_sec: f64,
    /// Path to the raw extracted JPEG, relative to the job's frames
    /// directory.
    pub path: String,
    /// Path to the bounding-box overlay, present only when annotation is
    /// enabled and at least one detection carried a bbox.
    pub annotated_path: Option<String>,
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(index: u32, timestamp_sec: f64, path: impl Into<String>) -> Self {
        Self {
            index,
            timestamp_sec,
            path: path.into(),
            annotated_path: None,
            detections: Vec::new(),
        }
    }

    /// Whether any detection on this frame carries a bounding box, i.e.
    /// whether an annotated overlay is worth producing.
    pub fn has_drawable_detections(&self) -> bool {
        self.detections.iter().any(|d| d.bbox.is_some())
    }

    /// True iff some surviving detection on this frame has the given
    /// canonical label (used by `list_frames`/`nearest_frame` entity
    /// filters).
    pub fn contains_label(&self, label: &str) -> bool {
        self.detections.iter().any(|d| d.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Source;

    #[test]
    fn frame_with_boxed_detection_is_drawable() {
        let mut frame = Frame::new(0, 0.0, "frame_000000.jpg");
        frame.detections.push(Detection::new("aircraft", Source::Yolo, 0.9));
        assert!(!frame.has_drawable_detections());

        frame.detections[0] = frame.detections[0]
            .clone()
            .with_bbox(crate::detection::BoundingBox { x: 0.0, y: 0.0, w: 10.0, h: 10.0 });
        assert!(frame.has_drawable_detections());
    }

    #[test]
    fn contains_label_matches_canonical_form() {
        let mut frame = Frame::new(1, 5.0, "frame_000001.jpg");
        frame.detections.push(Detection::new("Fighter Jet", Source::Discovery, 0.5));
        assert!(frame.contains_label("fighter jet"));
        assert!(!frame.contains_label("helicopter"));
    }
}
