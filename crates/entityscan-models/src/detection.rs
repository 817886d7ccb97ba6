//! Detection records and label normalization.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// The detector that produced a [`Detection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Yolo,
    Discovery,
    OpenVocab,
    Verify,
    Ocr,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Yolo => "yolo",
            Source::Discovery => "discovery",
            Source::OpenVocab => "open_vocab",
            Source::Verify => "verify",
            Source::Ocr => "ocr",
        }
    }

    /// All five sources, in a fixed order used wherever `source_diversity`
    /// needs a denominator.
    pub const ALL: [Source; 5] = [
        Source::Yolo,
        Source::Discovery,
        Source::OpenVocab,
        Source::Verify,
        Source::Ocr,
    ];
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An axis-aligned bounding box in pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    /// Clip the box so it lies entirely within an `image_width x
    /// image_height` frame.
    pub fn clip_to(&self, image_width: u32, image_height: u32) -> Self {
        let iw = image_width as f32;
        let ih = image_height as f32;
        let x0 = self.x.max(0.0).min(iw);
        let y0 = self.y.max(0.0).min(ih);
        let x1 = (self.x + self.w).max(0.0).min(iw);
        let y1 = (self.y + self.h).max(0.0).min(ih);
        Self {
            x: x0,
            y: y0,
            w: (x1 - x0).max(0.0),
            h: (y1 - y0).max(0.0),
        }
    }
}

/// A single observation attached to a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Canonical label: lowercased, trimmed, whitespace-collapsed.
    pub label: String,
    pub source: Source,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    pub bbox: Option<BoundingBox>,
    /// Raw OCR text payload, OCR source only.
    pub raw_text: Option<String>,
}

impl Detection {
    pub fn new(label: impl Into<String>, source: Source, confidence: f32) -> Self {
        Self {
            label: normalize_label(&label.into()),
            source,
            confidence: confidence.clamp(0.0, 1.0),
            bbox: None,
            raw_text: None,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_raw_text(mut self, raw_text: impl Into<String>) -> Self {
        self.raw_text = Some(raw_text.into());
        self
    }
}

/// Unicode-normalize, lowercase, collapse internal whitespace, and trim a
/// label. Returns the empty string for input that collapses entirely to
/// whitespace; callers must drop those.
pub fn normalize_label(raw: &str) -> String {
    let nfc: String = raw.nfc().collect();
    let collapsed = nfc
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    collapsed.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_label("  Fighter   Jet \n"), "fighter jet");
    }

    #[test]
    fn whitespace_only_label_collapses_to_empty() {
        assert_eq!(normalize_label("   \t  "), "");
    }

    #[test]
    fn bbox_clips_to_image_bounds() {
        let bbox = BoundingBox { x: -10.0, y: 5.0, w: 50.0, h: 50.0 }.clip_to(30, 40);
        assert_eq!(bbox.x, 0.0);
        assert_eq!(bbox.y, 5.0);
        assert_eq!(bbox.w, 30.0);
        assert_eq!(bbox.h, 35.0);
    }

    #[test]
    fn detection_confidence_is_clamped() {
        let d = Detection::new("tank", Source::Yolo, 1.5);
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn source_display_matches_wire_format() {
        assert_eq!(Source::OpenVocab.to_string(), "open_vocab");
    }
}
