//! Detector Fusion: runs up to five detection sources per
//! frame, normalizes their outputs into [`Detection`] records, and
//! enforces each source's sampling cadence.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use entityscan_models::{Detection, DetectorConfig, Source};

use crate::capability_table::CapabilityTable;

/// A source runs on frame `k` iff `k mod every_n == 0`.
fn on_cadence(frame_position: u32, every_n: u32) -> bool {
    every_n == 0 || frame_position % every_n.max(1) == 0
}

/// Generic phrases discovery candidates are filtered against regardless
/// of `discovery_only_military`.
const STOP_PHRASES: &[&str] = &[
    "large", "many", "over", "several", "various", "some", "a lot", "thing", "object", "scene",
    "image", "picture", "background",
];

/// Domain lexicon consulted when `discovery_only_military` is set.
/// A candidate passes if any of its whitespace tokens matches an entry
/// here.
const DOMAIN_LEXICON: &[&str] = &[
    "military", "soldier", "troop", "troops", "tank", "aircraft", "jet", "fighter", "helicopter",
    "missile", "artillery", "weapon", "rifle", "gun", "uniform", "armored", "armor", "vehicle",
    "convoy", "bunker", "drone", "warship", "submarine", "carrier", "infantry",
];

/// The default label-mapping table. Fully overridable via [`FusionConfig::label_mapping`].
fn default_label_mapping() -> HashMap<String, String> {
    HashMap::from([
        ("person".to_string(), "military personnel".to_string()),
        ("airplane".to_string(), "aircraft".to_string()),
        ("truck".to_string(), "armored vehicle".to_string()),
    ])
}

/// Tuning that rides alongside [`DetectorConfig`] but has no natural home
/// there because it is a table, not a scalar.
#[derive(Debug, Clone)]
pub struct FusionConfig {
    pub label_mapping: HashMap<String, String>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            label_mapping: default_label_mapping(),
        }
    }
}

/// Per-job mutable state Detector Fusion threads across frames: cadence
/// is counted over the pruned sequence, and discovery/verification both
/// need memory of prior frames.
#[derive(Default)]
pub struct FusionState {
    /// Consecutive eligible-frame streak per discovery candidate label.
    discovery_streak: HashMap<String, u32>,
    /// Labels confirmed by the verification pass at least once.
    confirmed: HashSet<String>,
    /// All discovery candidates ever proposed, for the verification
    /// pass's "top-K discovered labels".
    discovery_scores: HashMap<String, f32>,
    /// Frames on which the YOLO object detector was actually invoked.
    yolo_attempts: u32,
    /// Of those, how many raised rather than returning a (possibly
    /// empty) detection list.
    yolo_failures: u32,
}

impl FusionState {
    pub fn confirmed_labels(&self) -> &HashSet<String> {
        &self.confirmed
    }

    /// Per spec.md §7 `CapabilityRuntimeError`: non-fatal per frame, but
    /// fatal if the mandatory YOLO source raised on every frame it was
    /// invoked on.
    pub fn yolo_failed_every_frame(&self) -> bool {
        self.yolo_attempts > 0 && self.yolo_failures == self.yolo_attempts
    }
}

pub struct Fusion {
    capabilities: Arc<CapabilityTable>,
    detectors: DetectorConfig,
    fusion: FusionConfig,
}

impl Fusion {
    pub fn new(capabilities: Arc<CapabilityTable>, detectors: DetectorConfig, fusion: FusionConfig) -> Self {
        Self { capabilities, detectors, fusion }
    }

    /// Run every enabled, on-cadence source over one frame and return its
    /// flat detection list.
    pub async fn detect_frame(
        &self,
        frame_position: u32,
        frame_path: &Path,
        state: &mut FusionState,
    ) -> Vec<Detection> {
        let mut out = Vec::new();

        if let Some(detector) = &self.capabilities.object_detector {
            state.yolo_attempts += 1;
            match detector.detect(frame_path).await {
                Ok(detections) => out.extend(self.fuse_yolo(detections)),
                Err(e) => {
                    state.yolo_failures += 1;
                    tracing::warn!(error = %e, "object detector raised on frame, skipping");
                }
            }
        }

        if self.detectors.discovery_enabled && on_cadence(frame_position, self.detectors.discovery_every_n) {
            if let Some(discovery) = &self.capabilities.caption_discovery {
                match discovery.discover(frame_path).await {
                    Ok(candidates) => out.extend(self.fuse_discovery(candidates, state)),
                    Err(e) => tracing::warn!(error = %e, "caption discovery raised on frame, skipping"),
                }
            }
        }

        if self.detectors.open_vocab_enabled
            && on_cadence(frame_position, self.detectors.open_vocab_every_n)
            && !self.detectors.open_vocab_labels.is_empty()
        {
            if let Some(scorer) = &self.capabilities.open_vocab_scorer {
                match scorer.score(frame_path, &self.detectors.open_vocab_labels).await {
                    Ok(scores) => out.extend(self.fuse_open_vocab(scores)),
                    Err(e) => tracing::warn!(error = %e, "open-vocab scorer raised on frame, skipping"),
                }
            }
        }

        if self.detectors.verify_enabled && on_cadence(frame_position, self.detectors.verify_every_n) {
            if let Some(scorer) = &self.capabilities.open_vocab_scorer {
                self.run_verification(frame_path, scorer.as_ref(), state).await;
            }
        }

        if self.detectors.ocr_enabled && on_cadence(frame_position, self.detectors.ocr_every_n) {
            if let Some(reader) = &self.capabilities.ocr_reader {
                match reader.read(frame_path).await {
                    Ok(detections) => out.extend(self.fuse_ocr(detections)),
                    Err(e) => tracing::warn!(error = %e, "OCR reader raised on frame, skipping"),
                }
            }
        }

        out
    }

    fn fuse_yolo(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections
            .into_iter()
            .filter(|d| d.confidence >= self.detectors.min_confidence)
            .filter(|d| !d.label.is_empty())
            .map(|mut d| {
                if let Some(mapped) = self.fusion.label_mapping.get(&d.label) {
                    d.label = mapped.clone();
                }
                d
            })
            .collect()
    }

    fn fuse_discovery(
        &self,
        candidates: Vec<entityscan_media::DiscoveryCandidate>,
        state: &mut FusionState,
    ) -> Vec<Detection> {
        let mut kept = Vec::new();
        let eligible: Vec<_> = candidates
            .into_iter()
            .filter(|c| c.score >= self.detectors.discovery_min_score)
            .filter(|c| !c.label.is_empty())
            .filter(|c| !is_stop_phrase(&c.label))
            .filter(|c| !self.detectors.discovery_only_military || intersects_lexicon(&c.label))
            .take(self.detectors.discovery_max_phrases as usize)
            .collect();

        let mut seen_this_frame = HashSet::new();
        for candidate in eligible {
            state.discovery_scores.insert(candidate.label.clone(), candidate.score);
            let streak = state.discovery_streak.entry(candidate.label.clone()).or_insert(0);
            *streak += 1;
            seen_this_frame.insert(candidate.label.clone());

            if *streak >= self.detectors.discovery_min_consecutive.max(1) {
                kept.push(Detection::new(candidate.label.clone(), Source::Discovery, candidate.score));
            }
        }

        // Reset the streak for any previously tracked candidate absent
        // this frame, so "successive eligible frames" really means successive.
        let stale: Vec<String> = state
            .discovery_streak
            .keys()
            .filter(|label| !seen_this_frame.contains(*label))
            .cloned()
            .collect();
        for label in stale {
            state.discovery_streak.remove(&label);
        }

        kept
    }

    fn fuse_open_vocab(&self, scores: std::collections::BTreeMap<String, f32>) -> Vec<Detection> {
        scores
            .into_iter()
            .filter(|(_, score)| *score >= self.detectors.open_vocab_threshold)
            .map(|(label, score)| Detection::new(label, Source::OpenVocab, score))
            .collect()
    }

    async fn run_verification(
        &self,
        frame_path: &Path,
        scorer: &dyn entityscan_media::OpenVocabScorer,
        state: &mut FusionState,
    ) {
        let mut labels: Vec<(String, f32)> = state.discovery_scores.iter().map(|(l, s)| (l.clone(), *s)).collect();
        labels.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        labels.truncate(self.detectors.verify_max_labels as usize);
        if labels.is_empty() {
            return;
        }
        let top_labels: Vec<String> = labels.into_iter().map(|(l, _)| l).collect();

        match scorer.score(frame_path, &top_labels).await {
            Ok(scores) => {
                for (label, score) in scores {
                    if score >= self.detectors.verify_threshold {
                        state.confirmed.insert(label);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "verification pass raised on frame, skipping"),
        }
    }

    fn fuse_ocr(&self, detections: Vec<Detection>) -> Vec<Detection> {
        let threshold = (self.detectors.ocr_min_confidence / 100.0).clamp(0.0, 1.0);
        detections
            .into_iter()
            .filter(|d| d.confidence >= threshold)
            .filter(|d| !d.label.is_empty())
            .collect()
    }
}

fn is_stop_phrase(label: &str) -> bool {
    STOP_PHRASES.contains(&label)
}

fn intersects_lexicon(label: &str) -> bool {
    label.split_whitespace().any(|token| DOMAIN_LEXICON.contains(&token))
}

/// Drop unconfirmed discovery detections from already-detected frames
///. A no-op when verification is disabled.
pub fn drop_unconfirmed_discovery(
    frames: &mut [entityscan_models::Frame],
    confirmed: &HashSet<String>,
    verify_enabled: bool,
) {
    if !verify_enabled {
        return;
    }
    for frame in frames {
        frame
            .detections
            .retain(|d| d.source != Source::Discovery || confirmed.contains(&d.label));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_phrase_is_rejected() {
        assert!(is_stop_phrase("large"));
        assert!(!is_stop_phrase("fighter jet"));
    }

    #[test]
    fn lexicon_requires_a_military_token() {
        assert!(intersects_lexicon("fighter jet"));
        assert!(!intersects_lexicon("red balloon"));
    }

    #[test]
    fn cadence_fires_on_multiples() {
        assert!(on_cadence(0, 4));
        assert!(on_cadence(4, 4));
        assert!(!on_cadence(1, 4));
        assert!(on_cadence(5, 1));
    }

    #[test]
    fn default_mapping_covers_spec_example() {
        let mapping = default_label_mapping();
        assert_eq!(mapping.get("person").map(String::as_str), Some("military personnel"));
        assert_eq!(mapping.get("airplane").map(String::as_str), Some("aircraft"));
        assert_eq!(mapping.get("truck").map(String::as_str), Some("armored vehicle"));
    }

    #[test]
    fn yolo_failed_every_frame_requires_at_least_one_attempt() {
        let mut state = FusionState::default();
        assert!(!state.yolo_failed_every_frame());
        state.yolo_attempts = 3;
        state.yolo_failures = 2;
        assert!(!state.yolo_failed_every_frame());
        state.yolo_failures = 3;
        assert!(state.yolo_failed_every_frame());
    }

    #[test]
    fn drop_unconfirmed_discovery_keeps_confirmed_only() {
        let mut frame = entityscan_models::Frame::new(0, 0.0, "frame_000000.jpg");
        frame.detections.push(Detection::new("aircraft", Source::Discovery, 0.5));
        frame.detections.push(Detection::new("tank", Source::Discovery, 0.4));
        let mut confirmed = HashSet::new();
        confirmed.insert("aircraft".to_string());

        let mut frames = vec![frame];
        drop_unconfirmed_discovery(&mut frames, &confirmed, true);

        assert_eq!(frames[0].detections.len(), 1);
        assert_eq!(frames[0].detections[0].label, "aircraft");
    }
}
