//! Worker-process configuration: concurrency and runtime knobs layered on
//! top of `entityscan_models::PipelineConfig`.

use std::time::Duration;

use entityscan_models::PipelineConfig;

/// Everything the worker binary needs beyond the pipeline's own config:
/// how many jobs run in parallel and how the broker is sized.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub pipeline: PipelineConfig,
    /// Bound on jobs this worker processes concurrently.
    pub max_concurrent_jobs: usize,
    /// Soft per-stage time budget,
    /// applied uniformly; a production deployment could vary this per
    /// stage, but the spec does not call for that.
    pub stage_timeout: Duration,
    pub annotate_frames: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            max_concurrent_jobs: 2,
            stage_timeout: Duration::from_secs(600),
            annotate_frames: true,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let pipeline = PipelineConfig::from_env();
        let default = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.max_concurrent_jobs),
            stage_timeout: Duration::from_secs(
                std::env::var("WORKER_STAGE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default.stage_timeout.as_secs()),
            ),
            annotate_frames: pipeline.annotate_frames,
            pipeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.max_concurrent_jobs, 2);
        assert!(cfg.annotate_frames);
    }
}
