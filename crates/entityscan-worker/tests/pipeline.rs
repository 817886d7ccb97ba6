//! End-to-end pipeline integration test: submit a job against a tempdir
//! store, drive it through `StageDriver::run_job` with synthetic
//! capabilities, and check the resulting job/report state.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use entityscan_media::{ExtractedFrame, FrameExtractor, MediaResult};
use entityscan_models::{JobStatus, PipelineConfig};
use entityscan_queue::ProgressChannel;
use entityscan_store::{connect, JobStore, StoreConfig};
use entityscan_worker::{CancellationRegistry, CapabilityTable, SearchIndex, StageDriver};

/// A deterministic stand-in for ffmpeg: writes two blank JPEGs into
/// `out_dir` and reports them as extracted frames, without touching
/// `video_path` at all.
struct FixedFrameExtractor;

#[async_trait]
impl FrameExtractor for FixedFrameExtractor {
    async fn extract(
        &self,
        _video_path: &Path,
        interval_sec: u32,
        _smart_sampling: bool,
        out_dir: &Path,
    ) -> MediaResult<Vec<ExtractedFrame>> {
        let mut frames = Vec::new();
        for index in 0..2u32 {
            let path = out_dir.join(format!("frame_{index:06}.jpg"));
            let image = image::RgbImage::new(4, 4);
            image.save(&path).expect("write synthetic frame");
            frames.push(ExtractedFrame {
                index,
                timestamp_sec: (index * interval_sec) as f64,
                path,
            });
        }
        Ok(frames)
    }
}

async fn build_driver(data_dir: &Path) -> (StageDriver, JobStore) {
    let db_path = data_dir.join("state.db");
    let store_config = StoreConfig {
        database_url: format!("sqlite://{}", db_path.display()),
        ..StoreConfig::default()
    };
    let pool = connect(&store_config).await.expect("open state store");
    let store = JobStore::new(pool);

    let mut pipeline = PipelineConfig::default();
    pipeline.data_dir = data_dir.to_string_lossy().to_string();
    pipeline.annotate_frames = false;

    let capabilities = Arc::new(CapabilityTable::new(Arc::new(FixedFrameExtractor)));
    let index = Arc::new(SearchIndex::new(None));
    let driver = StageDriver::new(
        store.clone(),
        ProgressChannel::new(),
        capabilities,
        pipeline,
        Duration::from_secs(30),
        index,
        Arc::new(CancellationRegistry::new()),
    );
    (driver, store)
}

#[tokio::test]
async fn run_job_carries_a_queued_job_to_completion() {
    let workdir = TempDir::new().unwrap();
    let (driver, store) = build_driver(workdir.path()).await;

    let video_id = store.submit("clip.mp4", Some(5), None).await.unwrap();
    let dummy_video = workdir.path().join("video.mp4");
    tokio::fs::write(&dummy_video, b"not a real video").await.unwrap();
    store
        .set_paths(&video_id, Some(&dummy_video.to_string_lossy()), None)
        .await
        .unwrap();

    driver.run_job(video_id.clone()).await.unwrap();

    let job = store.get(&video_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.frames_analyzed, 2);

    let report_path = job.report_path.expect("completed job has a report_path");
    let body = tokio::fs::read(&report_path).await.unwrap();
    let report: entityscan_models::Report = serde_json::from_slice(&body).unwrap();
    assert_eq!(report.video_id, video_id);
    assert_eq!(report.frames_analyzed, 2);
}

#[tokio::test]
async fn run_job_is_idempotent_against_an_already_terminal_job() {
    let workdir = TempDir::new().unwrap();
    let (driver, store) = build_driver(workdir.path()).await;

    let video_id = store.submit("clip.mp4", Some(5), None).await.unwrap();
    let dummy_video = workdir.path().join("video.mp4");
    tokio::fs::write(&dummy_video, b"not a real video").await.unwrap();
    store
        .set_paths(&video_id, Some(&dummy_video.to_string_lossy()), None)
        .await
        .unwrap();

    driver.run_job(video_id.clone()).await.unwrap();
    let first = store.get(&video_id).await.unwrap();

    // A redelivered task for the same (now completed) job must be a no-op:
    // `run_job` checks terminal status before touching the store again.
    driver.run_job(video_id.clone()).await.unwrap();
    let second = store.get(&video_id).await.unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(first.updated_at, second.updated_at);
}

#[tokio::test]
async fn run_job_fails_cleanly_when_video_path_is_missing() {
    let workdir = TempDir::new().unwrap();
    let (driver, store) = build_driver(workdir.path()).await;

    let video_id = store.submit("clip.mp4", Some(5), None).await.unwrap();

    driver.run_job(video_id.clone()).await.unwrap();

    let job = store.get(&video_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.is_some());
}
