//! Worker-wide pipeline configuration.
//!
//! All values are read once, at worker start, following the
//! `env::var(..).ok().and_then(|s| s.parse().ok()).unwrap_or(default)`
//! idiom rather than a derive-based config crate.

use std::time::Duration;

/// Per-source detector tuning.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub min_confidence: f32,
    pub min_consecutive: u32,

    pub open_vocab_enabled: bool,
    pub open_vocab_threshold: f32,
    pub open_vocab_every_n: u32,
    pub open_vocab_min_consecutive: u32,
    pub open_vocab_labels: Vec<String>,

    pub discovery_enabled: bool,
    pub discovery_every_n: u32,
    pub discovery_min_score: f32,
    pub discovery_min_consecutive: u32,
    pub discovery_max_phrases: u32,
    pub discovery_only_military: bool,

    pub verify_enabled: bool,
    pub verify_threshold: f32,
    pub verify_every_n: u32,
    pub verify_max_labels: u32,

    pub ocr_enabled: bool,
    pub ocr_every_n: u32,
    pub ocr_min_confidence: f32,

    pub confidence_min_score: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.25,
            min_consecutive: 2,
            open_vocab_enabled: false,
            open_vocab_threshold: 0.27,
            open_vocab_every_n: 1,
            open_vocab_min_consecutive: 1,
            open_vocab_labels: Vec::new(),
            discovery_enabled: true,
            discovery_every_n: 1,
            discovery_min_score: 0.2,
            discovery_min_consecutive: 1,
            discovery_max_phrases: 8,
            discovery_only_military: true,
            verify_enabled: true,
            verify_threshold: 0.27,
            verify_every_n: 3,
            verify_max_labels: 12,
            ocr_enabled: true,
            ocr_every_n: 4,
            ocr_min_confidence: 60.0,
            confidence_min_score: 0.1,
        }
    }
}

impl DetectorConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            min_confidence: env_f32("MIN_CONFIDENCE", default.min_confidence),
            min_consecutive: env_u32("MIN_CONSECUTIVE", default.min_consecutive),
            open_vocab_enabled: env_bool("OPEN_VOCAB_ENABLED", default.open_vocab_enabled),
            open_vocab_threshold: env_f32("OPEN_VOCAB_THRESHOLD", default.open_vocab_threshold),
            open_vocab_every_n: env_u32("OPEN_VOCAB_EVERY_N", default.open_vocab_every_n),
            open_vocab_min_consecutive: env_u32(
                "OPEN_VOCAB_MIN_CONSECUTIVE",
                default.open_vocab_min_consecutive,
            ),
            open_vocab_labels: env_list("OPEN_VOCAB_LABELS", default.open_vocab_labels),
            discovery_enabled: env_bool("DISCOVERY_ENABLED", default.discovery_enabled),
            discovery_every_n: env_u32("DISCOVERY_EVERY_N", default.discovery_every_n),
            discovery_min_score: env_f32("DISCOVERY_MIN_SCORE", default.discovery_min_score),
            discovery_min_consecutive: env_u32(
                "DISCOVERY_MIN_CONSECUTIVE",
                default.discovery_min_consecutive,
            ),
            discovery_max_phrases: env_u32("DISCOVERY_MAX_PHRASES", default.discovery_max_phrases),
            discovery_only_military: env_bool(
                "DISCOVERY_ONLY_MILITARY",
                default.discovery_only_military,
            ),
            verify_enabled: env_bool("VERIFY_ENABLED", default.verify_enabled),
            verify_threshold: env_f32("VERIFY_THRESHOLD", default.verify_threshold),
            verify_every_n: env_u32("VERIFY_EVERY_N", default.verify_every_n),
            verify_max_labels: env_u32("VERIFY_MAX_LABELS", default.verify_max_labels),
            ocr_enabled: env_bool("OCR_ENABLED", default.ocr_enabled),
            ocr_every_n: env_u32("OCR_EVERY_N", default.ocr_every_n),
            ocr_min_confidence: env_f32("OCR_MIN_CONFIDENCE", default.ocr_min_confidence),
            confidence_min_score: env_f64("CONFIDENCE_MIN_SCORE", default.confidence_min_score),
        }
    }
}

/// Worker-wide configuration covering storage, the broker, sampling, and
/// detector tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: String,
    pub state_db_url: String,
    pub broker_url: Option<String>,

    pub default_interval_sec: u32,
    pub smart_sampling_enabled: bool,
    pub smart_sampling_diff_threshold: f32,
    pub smart_sampling_min_keep: u32,

    pub annotate_frames: bool,
    pub stale_after: Duration,

    pub detectors: DetectorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            state_db_url: "sqlite://./data/state.db".to_string(),
            broker_url: None,
            default_interval_sec: 5,
            smart_sampling_enabled: true,
            smart_sampling_diff_threshold: 0.06,
            smart_sampling_min_keep: 6,
            annotate_frames: true,
            stale_after: Duration::from_secs(15 * 60),
            detectors: DetectorConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        let data_dir = std::env::var("DATA_DIR").unwrap_or(default.data_dir);
        let state_db_url = std::env::var("STATE_DB_URL")
            .unwrap_or_else(|_| format!("sqlite://{data_dir}/state.db"));
        Self {
            state_db_url,
            broker_url: std::env::var("BROKER_URL").ok().filter(|s| !s.is_empty()),
            default_interval_sec: env_u32("DEFAULT_INTERVAL_SEC", default.default_interval_sec),
            smart_sampling_enabled: env_bool(
                "SMART_SAMPLING_ENABLED",
                default.smart_sampling_enabled,
            ),
            smart_sampling_diff_threshold: env_f32(
                "SMART_SAMPLING_DIFF_THRESHOLD",
                default.smart_sampling_diff_threshold,
            ),
            smart_sampling_min_keep: env_u32(
                "SMART_SAMPLING_MIN_KEEP",
                default.smart_sampling_min_keep,
            ),
            annotate_frames: env_bool("ANNOTATE_FRAMES", default.annotate_frames),
            stale_after: Duration::from_secs(env_u64(
                "STALE_AFTER_SECS",
                default.stale_after.as_secs(),
            )),
            detectors: DetectorConfig::from_env(),
            data_dir,
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_list(key: &str, default: Vec<String>) -> Vec<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.default_interval_sec, 5);
        assert!(cfg.smart_sampling_enabled);
        assert_eq!(cfg.smart_sampling_diff_threshold, 0.06);
        assert_eq!(cfg.smart_sampling_min_keep, 6);
        assert_eq!(cfg.stale_after, Duration::from_secs(900));

        let detectors = &cfg.detectors;
        assert_eq!(detectors.min_confidence, 0.25);
        assert_eq!(detectors.min_consecutive, 2);
        assert!(!detectors.open_vocab_enabled);
        assert_eq!(detectors.discovery_every_n, 1);
        assert_eq!(detectors.verify_every_n, 3);
        assert_eq!(detectors.ocr_every_n, 4);
        assert_eq!(detectors.confidence_min_score, 0.1);
    }

    #[test]
    fn env_list_filters_blank_entries() {
        std::env::set_var("TEST_OPEN_VOCAB_LABELS", "tank, , aircraft");
        let parsed = env_list("TEST_OPEN_VOCAB_LABELS", Vec::new());
        assert_eq!(parsed, vec!["tank".to_string(), "aircraft".to_string()]);
        std::env::remove_var("TEST_OPEN_VOCAB_LABELS");
    }
}
