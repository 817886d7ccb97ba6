//! Per-label aggregation output.

use serde::{Deserialize, Serialize};

use crate::detection::Source;
use crate::timestamp::format_mm_ss;

/// A closed interval of continuous presence, with `mm:ss` labels for
/// display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_sec: f64,
    pub end_sec: f64,
    pub start_label: String,
    pub end_label: String,
}

impl TimeRange {
    pub fn new(start_sec: f64, end_sec: f64) -> Self {
        Self {
            start_sec,
            end_sec,
            start_label: format_mm_ss(start_sec),
            end_label: format_mm_ss(end_sec),
        }
    }
}

/// Aggregated evidence for one label across an entire job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySummary {
    pub count: u32,
    pub appearances: u32,
    pub presence: f64,
    pub time_ranges: Vec<TimeRange>,
    pub confidence_score: f64,
    pub sources: Vec<Source>,
}

impl EntitySummary {
    /// Invariant check used by tests and by the aggregator's own
    /// self-verification: ranges sorted, non-overlapping, each with
    /// `start_sec <= end_sec`.
    pub fn time_ranges_are_well_formed(&self) -> bool {
        for range in &self.time_ranges {
            if range.start_sec > range.end_sec {
                return false;
            }
        }
        self.time_ranges
            .windows(2)
            .all(|pair| pair[1].start_sec > pair[0].end_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_range_carries_mm_ss_labels() {
        let range = TimeRange::new(65.0, 70.0);
        assert_eq!(range.start_label, "01:05");
        assert_eq!(range.end_label, "01:10");
    }

    #[test]
    fn well_formed_ranges_pass_invariant_check() {
        let summary = EntitySummary {
            count: 5,
            appearances: 5,
            presence: 1.0,
            time_ranges: vec![TimeRange::new(0.0, 5.0), TimeRange::new(10.0, 15.0)],
            confidence_score: 0.8,
            sources: vec![Source::Yolo],
        };
        assert!(summary.time_ranges_are_well_formed());
    }

    #[test]
    fn overlapping_ranges_fail_invariant_check() {
        let summary = EntitySummary {
            count: 2,
            appearances: 2,
            presence: 0.5,
            time_ranges: vec![TimeRange::new(0.0, 5.0), TimeRange::new(5.0, 10.0)],
            confidence_score: 0.5,
            sources: vec![],
        };
        assert!(!summary.time_ranges_are_well_formed());
    }
}
