//! Stage Driver: runs one job's stages in order, enforcing
//! the progress budget table, debounced status writes, cooperative
//! cancellation, and per-stage soft timeouts.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use entityscan_models::{Frame, Job, JobStatus, PipelineConfig, PipelineError, Report, Transcript, VideoId};
use entityscan_queue::{ProgressChannel, ProgressEvent};
use entityscan_store::JobStore;

use crate::aggregator::aggregate;
use crate::capability_table::CapabilityTable;
use crate::error::{WorkerError, WorkerResult};
use crate::fusion::{drop_unconfirmed_discovery, Fusion, FusionConfig, FusionState};
use crate::indexer::SearchIndex;
use crate::report_assembler::ReportAssembler;

/// Progress range a stage owns, inclusive of its start and exclusive of
/// its end except on the final stage.
struct StageBudget {
    start: u8,
    end: u8,
}

const EXTRACTING_FRAMES: StageBudget = StageBudget { start: 0, end: 20 };
const TRANSCRIBING_AUDIO_POINT: u8 = 20;
const DETECTING_ENTITIES: StageBudget = StageBudget { start: 20, end: 80 };
const AGGREGATING_REPORT: StageBudget = StageBudget { start: 80, end: 95 };
const INDEXING_SEARCH: StageBudget = StageBudget { start: 95, end: 100 };

const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(250);
const DEBOUNCE_FRAMES: u32 = 5;

/// Tracks which jobs a caller has asked to cancel. Checked at stage and frame boundaries; never
/// preempts mid-call.
#[derive(Default)]
pub struct CancellationRegistry {
    requested: RwLock<HashSet<VideoId>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn request(&self, video_id: &VideoId) {
        self.requested.write().await.insert(video_id.clone());
    }

    pub async fn is_requested(&self, video_id: &VideoId) -> bool {
        self.requested.read().await.contains(video_id)
    }

    async fn clear(&self, video_id: &VideoId) {
        self.requested.write().await.remove(video_id);
    }
}

pub struct StageDriver {
    store: JobStore,
    progress: ProgressChannel,
    capabilities: Arc<CapabilityTable>,
    pipeline: PipelineConfig,
    stage_timeout: Duration,
    index: Arc<SearchIndex>,
    cancellation: Arc<CancellationRegistry>,
}

impl StageDriver {
    pub fn new(
        store: JobStore,
        progress: ProgressChannel,
        capabilities: Arc<CapabilityTable>,
        pipeline: PipelineConfig,
        stage_timeout: Duration,
        index: Arc<SearchIndex>,
        cancellation: Arc<CancellationRegistry>,
    ) -> Self {
        Self { store, progress, capabilities, pipeline, stage_timeout, index, cancellation }
    }

    fn layout(&self, video_id: &VideoId) -> JobLayout {
        let root = PathBuf::from(&self.pipeline.data_dir);
        JobLayout {
            frames_dir: root.join("frames").join(video_id.as_str()),
            reports_dir: root.join("reports").join(video_id.as_str()),
        }
    }

    /// Process one job end to end. Called by the worker's dispatch loop
    /// after a task is dequeued; idempotent against a job that is already
    /// terminal.
    pub async fn run_job(&self, video_id: VideoId) -> WorkerResult<()> {
        let job = self.store.get(&video_id).await?;
        if job.is_terminal() {
            tracing::info!(video_id = %video_id, status = %job.status, "job already terminal, skipping");
            return Ok(());
        }

        self.store
            .update_status(&video_id, JobStatus::Processing, job.progress, Some("extracting_frames"), None)
            .await?;

        let result = self.run_stages(&video_id, &job).await;

        match result {
            Ok(()) => {
                self.progress.publish(&video_id, ProgressEvent::Completed).await;
            }
            Err(err) => {
                let status_text = err.status_text();
                tracing::warn!(video_id = %video_id, error = %status_text, "job failed");
                self.store.finish_failed(&video_id, status_text.clone()).await?;
                self.progress.publish(&video_id, ProgressEvent::Failed { error: status_text }).await;
                if matches!(&err, WorkerError::Pipeline(PipelineError::Cancelled)) {
                    self.remove_artifacts(&video_id).await;
                }
            }
        }
        self.cancellation.clear(&video_id).await;
        self.progress.retire(&video_id).await;
        Ok(())
    }

    async fn run_stages(&self, video_id: &VideoId, job: &Job) -> WorkerResult<()> {
        let layout = self.layout(video_id);
        tokio::fs::create_dir_all(&layout.frames_dir).await?;
        tokio::fs::create_dir_all(&layout.reports_dir).await?;
        self.store
            .set_paths(video_id, None, Some(layout.frames_dir.to_string_lossy().as_ref()))
            .await?;

        self.check_cancellation(video_id).await?;
        let mut frames = self.run_extraction(video_id, job, &layout).await?;

        self.check_cancellation(video_id).await?;
        let transcript = self.run_transcription(video_id, job).await;

        self.check_cancellation(video_id).await?;
        self.run_detection(video_id, &mut frames, &layout).await?;

        self.check_cancellation(video_id).await?;
        let report = self.run_aggregation(video_id, job, &mut frames, transcript, &layout).await?;

        self.check_cancellation(video_id).await?;
        self.run_indexing(video_id, &report).await;

        self.store
            .finish_ok(
                video_id,
                report.duration_sec,
                report.frames_analyzed,
                report.unique_entities,
                serde_json::to_value(&report.entities)?,
                layout.reports_dir.join("report.json").to_string_lossy().to_string(),
            )
            .await?;
        Ok(())
    }

    async fn check_cancellation(&self, video_id: &VideoId) -> WorkerResult<()> {
        if self.cancellation.is_requested(video_id).await {
            return Err(WorkerError::Pipeline(PipelineError::Cancelled));
        }
        Ok(())
    }

    async fn run_extraction(&self, video_id: &VideoId, job: &Job, layout: &JobLayout) -> WorkerResult<Vec<Frame>> {
        self.progress.publish(video_id, ProgressEvent::StageStarted { stage: "extracting_frames".into() }).await;
        self.store
            .update_status(video_id, JobStatus::Processing, EXTRACTING_FRAMES.start, Some("extracting_frames"), None)
            .await?;

        let video_path = job
            .video_path
            .as_ref()
            .ok_or_else(|| WorkerError::Pipeline(PipelineError::InputInvalid("job has no video_path".into())))?;

        let extracted = tokio::time::timeout(
            self.stage_timeout,
            self.capabilities.frame_extractor.extract(
                std::path::Path::new(video_path),
                job.interval_sec,
                self.pipeline.smart_sampling_enabled,
                &layout.frames_dir,
            ),
        )
        .await
        .map_err(|_| WorkerError::Pipeline(PipelineError::StageTimeout("extracting_frames".into())))??;

        let frames: Vec<Frame> = extracted
            .into_iter()
            .map(|ex| Frame::new(ex.index, ex.timestamp_sec, ex.path.to_string_lossy().to_string()))
            .collect();

        self.store
            .update_status(video_id, JobStatus::Processing, EXTRACTING_FRAMES.end, Some("extracting_frames"), None)
            .await?;
        self.progress
            .publish(video_id, ProgressEvent::StageProgress { stage: "extracting_frames".into(), progress: EXTRACTING_FRAMES.end })
            .await;
        Ok(frames)
    }

    /// Non-fatal by contract: any failure, including capability absence,
    /// is folded into `Transcript::error` rather than propagated.
    async fn run_transcription(&self, video_id: &VideoId, job: &Job) -> Option<Transcript> {
        self.progress.publish(video_id, ProgressEvent::StageStarted { stage: "transcribing_audio".into() }).await;

        let transcript = match &self.capabilities.transcriber {
            None => None,
            Some(transcriber) => {
                let video_path = job.video_path.as_ref()?;
                match tokio::time::timeout(self.stage_timeout, transcriber.transcribe(std::path::Path::new(video_path))).await {
                    Ok(Ok(transcript)) => Some(transcript),
                    Ok(Err(e)) => Some(Transcript::failed(e.to_string())),
                    Err(_) => Some(Transcript::failed("stage_timeout:transcribing_audio")),
                }
            }
        };

        let _ = self
            .store
            .update_status(video_id, JobStatus::Processing, TRANSCRIBING_AUDIO_POINT, Some("transcribing_audio"), None)
            .await;
        self.progress
            .publish(video_id, ProgressEvent::StageProgress { stage: "transcribing_audio".into(), progress: TRANSCRIBING_AUDIO_POINT })
            .await;
        transcript
    }

    async fn run_detection(&self, video_id: &VideoId, frames: &mut [Frame], layout: &JobLayout) -> WorkerResult<()> {
        self.progress.publish(video_id, ProgressEvent::StageStarted { stage: "detecting_entities".into() }).await;

        let fusion = Fusion::new(self.capabilities.clone(), self.pipeline.detectors.clone(), FusionConfig::default());
        let mut state = FusionState::default();
        let total_frames = frames.len() as u32;
        let mut last_write = Instant::now();
        let mut frames_since_write = 0u32;
        let stage_deadline = Instant::now() + self.stage_timeout;

        for position in 0..frames.len() {
            self.check_cancellation(video_id).await?;
            if Instant::now() >= stage_deadline {
                return Err(WorkerError::Pipeline(PipelineError::StageTimeout("detecting_entities".into())));
            }

            let frame_path = layout.frames_dir.join(&frames[position].path);
            let detections = fusion.detect_frame(frames[position].index, &frame_path, &mut state).await;
            frames[position].detections = detections;

            frames_since_write += 1;
            if last_write.elapsed() >= DEBOUNCE_INTERVAL || frames_since_write >= DEBOUNCE_FRAMES {
                let progress = detecting_entities_progress(position as u32 + 1, total_frames);
                self.store
                    .update_status(video_id, JobStatus::Processing, progress, Some("detecting_entities"), None)
                    .await?;
                self.progress
                    .publish(video_id, ProgressEvent::FrameProcessed { frame_index: frames[position].index, total_frames: Some(total_frames) })
                    .await;
                last_write = Instant::now();
                frames_since_write = 0;
            }
        }

        drop_unconfirmed_discovery(frames, state.confirmed_labels(), self.pipeline.detectors.verify_enabled);

        if state.yolo_failed_every_frame() {
            return Err(WorkerError::Pipeline(PipelineError::CapabilityRuntimeError {
                source: "yolo".into(),
                message: "object detector raised on every frame".into(),
            }));
        }

        self.store
            .update_status(video_id, JobStatus::Processing, DETECTING_ENTITIES.end, Some("detecting_entities"), None)
            .await?;
        Ok(())
    }

    async fn run_aggregation(
        &self,
        video_id: &VideoId,
        job: &Job,
        frames: &mut [Frame],
        transcript: Option<Transcript>,
        layout: &JobLayout,
    ) -> WorkerResult<Report> {
        self.progress.publish(video_id, ProgressEvent::StageStarted { stage: "aggregating_report".into() }).await;
        self.store
            .update_status(video_id, JobStatus::Processing, AGGREGATING_REPORT.start, Some("aggregating_report"), None)
            .await?;

        let entities = aggregate(frames, &self.pipeline.detectors);
        let duration_sec = self.probe_duration(job, frames).await;
        let assembler = ReportAssembler::new(self.pipeline.annotate_frames);
        let report = assembler.build_report(
            video_id.clone(),
            job.filename.clone(),
            duration_sec,
            job.interval_sec,
            frames,
            entities,
            transcript.clone(),
        );

        assembler.annotate_frames(&layout.frames_dir, frames).await?;

        assembler.persist(&layout.reports_dir, &report).await?;
        if let Some(transcript) = &transcript {
            let body = serde_json::to_vec_pretty(transcript)?;
            tokio::fs::write(layout.reports_dir.join("transcript.json"), body).await?;
        }
        let frames_index = serde_json::to_vec_pretty(frames)?;
        tokio::fs::write(layout.frames_dir.join("frames.json"), frames_index).await?;

        self.store
            .update_status(video_id, JobStatus::Processing, AGGREGATING_REPORT.end, Some("aggregating_report"), None)
            .await?;
        Ok(report)
    }

    /// The true video duration, via ffprobe, rather than the last
    /// retained frame's timestamp (which undercounts by up to
    /// `interval_sec` under uniform sampling). Falls back to the last
    /// frame's timestamp if the video is gone or ffprobe is unavailable.
    async fn probe_duration(&self, job: &Job, frames: &[Frame]) -> f64 {
        let fallback = frames.last().map(|f| f.timestamp_sec).unwrap_or(0.0);
        let Some(video_path) = &job.video_path else {
            return fallback;
        };
        match entityscan_media::probe::get_duration(video_path).await {
            Ok(duration) => duration,
            Err(e) => {
                tracing::warn!(error = %e, "ffprobe duration lookup failed, falling back to last frame timestamp");
                fallback
            }
        }
    }

    /// Non-fatal by contract.
    async fn run_indexing(&self, video_id: &VideoId, report: &Report) {
        self.progress.publish(video_id, ProgressEvent::StageStarted { stage: "indexing_search".into() }).await;
        self.index.index_job(video_id.clone(), report, JobStatus::Completed, chrono::Utc::now()).await;
        let _ = self
            .store
            .update_status(video_id, JobStatus::Processing, INDEXING_SEARCH.end, Some("indexing_search"), None)
            .await;
        self.progress
            .publish(video_id, ProgressEvent::StageProgress { stage: "indexing_search".into(), progress: INDEXING_SEARCH.end })
            .await;
    }

    async fn remove_artifacts(&self, video_id: &VideoId) {
        let layout = self.layout(video_id);
        let _ = tokio::fs::remove_dir_all(&layout.frames_dir).await;
        let _ = tokio::fs::remove_dir_all(&layout.reports_dir).await;
        self.index.remove_job(video_id.clone()).await;
    }
}

struct JobLayout {
    frames_dir: PathBuf,
    reports_dir: PathBuf,
}

/// Linear progress within `detecting_entities`'s 20..80 budget, by frames
/// processed rather than time.
fn detecting_entities_progress(frames_done: u32, total_frames: u32) -> u8 {
    if total_frames == 0 {
        return DETECTING_ENTITIES.end;
    }
    let span = (DETECTING_ENTITIES.end - DETECTING_ENTITIES.start) as u32;
    let delta = (span * frames_done.min(total_frames)) / total_frames;
    (DETECTING_ENTITIES.start as u32 + delta).min(DETECTING_ENTITIES.end as u32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detecting_entities_progress_is_linear_in_frames() {
        assert_eq!(detecting_entities_progress(0, 10), 20);
        assert_eq!(detecting_entities_progress(5, 10), 50);
        assert_eq!(detecting_entities_progress(10, 10), 80);
    }

    #[test]
    fn detecting_entities_progress_handles_zero_frames() {
        assert_eq!(detecting_entities_progress(0, 0), 80);
    }

    #[tokio::test]
    async fn cancellation_registry_round_trips() {
        let registry = CancellationRegistry::new();
        let video_id = VideoId::from("abcd1234");
        assert!(!registry.is_requested(&video_id).await);
        registry.request(&video_id).await;
        assert!(registry.is_requested(&video_id).await);
        registry.clear(&video_id).await;
        assert!(!registry.is_requested(&video_id).await);
    }
}
