//! Temporal Aggregator: merges per-frame detections into
//! the `entities` map of the Report.

use std::collections::{BTreeMap, HashMap};

use entityscan_models::{DetectorConfig, EntitySummary, Frame, Source, TimeRange};

/// Aggregate a job's frames into the Report's `entities` map
///. `frames` must be sorted ascending by `index`, dense and
/// 0-based, the invariant the Frame Extractor and Stage Driver uphold.
pub fn aggregate(frames: &[Frame], detectors: &DetectorConfig) -> BTreeMap<String, EntitySummary> {
    let frames_analyzed = frames.len();
    let mut per_label: HashMap<String, LabelAccumulator> = HashMap::new();

    for frame in frames {
        for detection in &frame.detections {
            if detection.label.is_empty() {
                continue;
            }
            per_label
                .entry(detection.label.clone())
                .or_insert_with(|| LabelAccumulator::new(frames_analyzed))
                .record(frame.index as usize, detection.source, detection.confidence);
        }
    }

    let mut entities = BTreeMap::new();
    // Iterate in label string order up front so any future non-determinism
    // in HashMap iteration cannot leak into tie-breaking.
    let mut labels: Vec<String> = per_label.keys().cloned().collect();
    labels.sort();

    for label in labels {
        let acc = per_label.remove(&label).expect("label present");
        if let Some(summary) = acc.finalize(frames, detectors) {
            entities.insert(label, summary);
        }
    }

    entities
}

struct LabelAccumulator {
    /// One slot per frame position, each holding every (source,
    /// confidence) pair observed for this label on that frame.
    frame_hits: Vec<Vec<(Source, f32)>>,
}

impl LabelAccumulator {
    fn new(num_frames: usize) -> Self {
        Self {
            frame_hits: vec![Vec::new(); num_frames],
        }
    }

    fn record(&mut self, frame_position: usize, source: Source, confidence: f32) {
        if let Some(slot) = self.frame_hits.get_mut(frame_position) {
            slot.push((source, confidence));
        }
    }

    fn finalize(&self, frames: &[Frame], detectors: &DetectorConfig) -> Option<EntitySummary> {
        let occ_raw: Vec<bool> = self.frame_hits.iter().map(|hits| !hits.is_empty()).collect();

        let sources_present: std::collections::HashSet<Source> =
            self.frame_hits.iter().flatten().map(|(source, _)| *source).collect();
        let min_consecutive = required_min_consecutive(&sources_present, detectors);

        let occ = filter_short_runs(&occ_raw, min_consecutive);

        let appearances = occ.iter().filter(|kept| **kept).count() as u32;
        if appearances == 0 {
            return None;
        }

        let mut count = 0u32;
        let mut confidences: Vec<f64> = Vec::new();
        let mut sources_seen: std::collections::HashSet<Source> = std::collections::HashSet::new();
        let mut ocr_evidence = false;

        for (position, hits) in self.frame_hits.iter().enumerate() {
            if !occ[position] {
                continue;
            }
            for (source, confidence) in hits {
                count += 1;
                confidences.push(*confidence as f64);
                sources_seen.insert(*source);
                if *source == Source::Ocr {
                    ocr_evidence = true;
                }
            }
        }

        let mean_confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };
        let source_diversity = sources_seen.len() as f64 / Source::ALL.len() as f64;
        let longest_run = longest_true_run(&occ);
        let consistency_ratio = longest_run as f64 / appearances as f64;
        let ocr_flag = if ocr_evidence { 1.0 } else { 0.0 };

        let confidence_score = (0.45 * mean_confidence
            + 0.25 * source_diversity
            + 0.20 * consistency_ratio
            + 0.10 * ocr_flag)
            .clamp(0.0, 1.0);

        if confidence_score < detectors.confidence_min_score {
            return None;
        }

        let presence = entityscan_models::round4(appearances as f64 / frames.len() as f64);
        let time_ranges = build_time_ranges(&occ, frames);

        let mut sources: Vec<Source> = sources_seen.into_iter().collect();
        sources.sort_by_key(source_rank);

        Some(EntitySummary {
            count,
            appearances,
            presence,
            time_ranges,
            confidence_score: entityscan_models::round4(confidence_score),
            sources,
        })
    }
}

/// Which `min_consecutive` threshold applies to a label, based on the
/// sources that contributed to it. YOLO-origin labels use the stricter
/// default of 2; open-vocab/discovery-only labels use their own,
/// looser, configured thresholds. A label backed
/// only by verify/OCR uses no additional filtering beyond 1 frame.
fn required_min_consecutive(sources: &std::collections::HashSet<Source>, detectors: &DetectorConfig) -> u32 {
    if sources.contains(&Source::Yolo) {
        detectors.min_consecutive.max(1)
    } else if sources.contains(&Source::OpenVocab) {
        detectors.open_vocab_min_consecutive.max(1)
    } else if sources.contains(&Source::Discovery) {
        detectors.discovery_min_consecutive.max(1)
    } else {
        1
    }
}

fn source_rank(source: &Source) -> usize {
    Source::ALL.iter().position(|s| s == source).unwrap_or(Source::ALL.len())
}

/// Zero out runs of `true` shorter than `min_run`.
fn filter_short_runs(occ: &[bool], min_run: u32) -> Vec<bool> {
    let mut out = vec![false; occ.len()];
    let mut i = 0;
    while i < occ.len() {
        if !occ[i] {
            i += 1;
            continue;
        }
        let start = i;
        while i < occ.len() && occ[i] {
            i += 1;
        }
        let run_len = (i - start) as u32;
        if run_len >= min_run {
            for slot in out.iter_mut().take(i).skip(start) {
                *slot = true;
            }
        }
    }
    out
}

/// Longest run of consecutive `true` values.
fn longest_true_run(occ: &[bool]) -> u32 {
    let mut longest = 0u32;
    let mut current = 0u32;
    for &value in occ {
        if value {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Emit one [`TimeRange`] per maximal run of `true`, without merging
/// across a false gap.
fn build_time_ranges(occ: &[bool], frames: &[Frame]) -> Vec<TimeRange> {
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < occ.len() {
        if !occ[i] {
            i += 1;
            continue;
        }
        let start = i;
        while i < occ.len() && occ[i] {
            i += 1;
        }
        let end = i - 1;
        let start_sec = entityscan_models::round_seconds(frames[start].timestamp_sec);
        let end_sec = entityscan_models::round_seconds(frames[end].timestamp_sec);
        ranges.push(TimeRange::new(start_sec, end_sec));
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use entityscan_models::Detection;

    fn frame_with(index: u32, timestamp_sec: f64, label: &str, source: Source, confidence: f32) -> Frame {
        let mut frame = Frame::new(index, timestamp_sec, format!("frame_{index:06}.jpg"));
        frame.detections.push(Detection::new(label, source, confidence));
        frame
    }

    #[test]
    fn ten_second_video_two_frame_run_matches_worked_example() {
        let frames = vec![
            frame_with(0, 0.0, "aircraft", Source::Yolo, 0.9),
            frame_with(1, 5.0, "aircraft", Source::Yolo, 0.9),
        ];
        let detectors = DetectorConfig::default();

        let entities = aggregate(&frames, &detectors);
        let summary = entities.get("aircraft").unwrap();

        assert_eq!(summary.appearances, 2);
        assert_eq!(summary.presence, 1.0);
        assert_eq!(summary.time_ranges.len(), 1);
        assert_eq!(summary.time_ranges[0].start_sec, 0.0);
        assert_eq!(summary.time_ranges[0].end_sec, 5.0);
        assert!((summary.confidence_score - 0.655).abs() < 1e-9);
    }

    #[test]
    fn thirty_second_video_two_ranges_match_worked_example() {
        let frames = vec![
            frame_with(0, 0.0, "helicopter", Source::Yolo, 0.8),
            frame_with(1, 5.0, "helicopter", Source::Yolo, 0.8),
            frame_with(2, 10.0, "helicopter", Source::Yolo, 0.8),
            Frame::new(3, 15.0, "frame_000003.jpg"),
            frame_with(4, 20.0, "helicopter", Source::Yolo, 0.8),
            frame_with(5, 25.0, "helicopter", Source::Yolo, 0.8),
        ];
        let detectors = DetectorConfig::default();

        let entities = aggregate(&frames, &detectors);
        let summary = entities.get("helicopter").unwrap();

        assert_eq!(summary.appearances, 5);
        assert_eq!(summary.count, 5);
        assert!((summary.presence - 0.8333).abs() < 1e-4);
        assert_eq!(summary.time_ranges.len(), 2);
        assert_eq!(summary.time_ranges[0].start_sec, 0.0);
        assert_eq!(summary.time_ranges[0].end_sec, 10.0);
        assert_eq!(summary.time_ranges[1].start_sec, 20.0);
        assert_eq!(summary.time_ranges[1].end_sec, 25.0);
    }

    #[test]
    fn single_frame_blip_below_min_consecutive_is_dropped() {
        let frames = vec![
            frame_with(0, 0.0, "tank", Source::Yolo, 0.9),
            Frame::new(1, 5.0, "frame_000001.jpg"),
            Frame::new(2, 10.0, "frame_000002.jpg"),
        ];
        let detectors = DetectorConfig::default();

        let entities = aggregate(&frames, &detectors);
        assert!(!entities.contains_key("tank"));
    }

    #[test]
    fn low_confidence_label_is_dropped_from_final_report() {
        let frames = vec![
            frame_with(0, 0.0, "shadow", Source::Discovery, 0.01),
            frame_with(1, 5.0, "shadow", Source::Discovery, 0.01),
        ];
        let mut detectors = DetectorConfig::default();
        detectors.confidence_min_score = 0.9;

        let entities = aggregate(&frames, &detectors);
        assert!(!entities.contains_key("shadow"));
    }

    #[test]
    fn no_detectors_produces_empty_entity_map() {
        let frames = vec![Frame::new(0, 0.0, "frame_000000.jpg"), Frame::new(1, 5.0, "frame_000001.jpg")];
        let detectors = DetectorConfig::default();
        assert!(aggregate(&frames, &detectors).is_empty());
    }
}
