//! `create_job`/`get_job`/`get_status`/`delete_job`.

use std::path::{Path, PathBuf};

use axum::extract::{Multipart, Path as AxumPath, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

use entityscan_models::{Job, JobStatus, VideoId};
use entityscan_queue::Task;

use crate::error::{ApiError, ApiResult};
use crate::security;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
struct Submission {
    interval_sec: Option<u32>,
    url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub video_id: String,
}

/// `create_job(inputs) -> video_id`. Accepts either a file
/// upload (`video` part, optional `voice_file` part) or a `url` part,
/// both carried as multipart fields alongside an optional `interval_sec`
/// field. Creates the job record in `queued` and never blocks on
/// processing: a URL submission's download runs in a detached task.
pub async fn create_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<CreateJobResponse>> {
    let mut form = Submission::default();
    let mut video_bytes: Option<(String, Vec<u8>)> = None;
    let mut voice_bytes: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "video" => {
                let filename = field.file_name().unwrap_or("video.mp4").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read video field: {e}")))?;
                if bytes.is_empty() {
                    return Err(ApiError::bad_request("uploaded video is empty"));
                }
                video_bytes = Some((filename, bytes.to_vec()));
            }
            "voice_file" => {
                let filename = field.file_name().unwrap_or("voice.txt").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read voice_file field: {e}")))?;
                voice_bytes = Some((filename, bytes.to_vec()));
            }
            "url" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read url field: {e}")))?;
                form.url = Some(text);
            }
            "interval_sec" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read interval_sec field: {e}")))?;
                form.interval_sec = text.trim().parse().ok();
            }
            _ => {}
        }
    }

    if video_bytes.is_none() && form.url.is_none() {
        return Err(ApiError::bad_request("submission must include a `video` file or a `url` field"));
    }
    if video_bytes.is_some() && form.url.is_some() {
        return Err(ApiError::bad_request("submission must not include both a `video` file and a `url` field"));
    }

    if let Some(url) = &form.url {
        match security::validate_video_url(url).into_result() {
            Ok(_) => {}
            Err(reason) => return Err(ApiError::bad_request(reason)),
        }
    }

    let filename = video_bytes
        .as_ref()
        .map(|(name, _)| name.clone())
        .or_else(|| form.url.as_ref().map(|u| filename_from_url(u)))
        .unwrap_or_else(|| "video.mp4".to_string());

    let voice_file_name = voice_bytes.as_ref().map(|_| "voice.txt".to_string());

    let video_id = state.store.submit(filename.clone(), form.interval_sec, voice_file_name).await?;

    let videos_dir = PathBuf::from(&state.pipeline.data_dir).join("videos").join(video_id.as_str());
    tokio::fs::create_dir_all(&videos_dir)
        .await
        .map_err(|e| ApiError::internal(format!("failed to create video directory: {e}")))?;

    if let Some((_, bytes)) = &voice_bytes {
        let voice_path = videos_dir.join("voice.txt");
        write_atomic(&voice_path, bytes)
            .await
            .map_err(|e| ApiError::internal(format!("failed to persist voice file: {e}")))?;
    }

    if let Some((name, bytes)) = video_bytes {
        let ext = Path::new(&name).extension().and_then(|s| s.to_str()).unwrap_or("mp4");
        let video_path = videos_dir.join(format!("video.{ext}"));
        write_atomic(&video_path, &bytes)
            .await
            .map_err(|e| ApiError::internal(format!("failed to persist video: {e}")))?;

        state.store.set_paths(&video_id, Some(&video_path.to_string_lossy()), None).await?;
        enqueue(&state, video_id.clone()).await?;
    } else if let Some(url) = form.url {
        let video_path = videos_dir.join("video.mp4");
        spawn_fetch(state.clone(), video_id.clone(), url, video_path);
    }

    Ok(Json(CreateJobResponse { video_id: video_id.to_string() }))
}

fn filename_from_url(url: &str) -> String {
    url.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("video").to_string()
}

async fn write_atomic(dst: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = dst.parent().unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(parent)?;
    tokio::fs::write(tmp.path(), bytes).await?;
    tmp.persist(dst).map_err(|e| e.error)?;
    Ok(())
}

/// Fetches a submitted URL in the background. The job stays `queued` until the download completes, so a
/// slow or failing fetch never blocks `create_job`'s response.
fn spawn_fetch(state: AppState, video_id: VideoId, url: String, video_path: PathBuf) {
    tokio::spawn(async move {
        info!(video_id = %video_id, url = %url, "fetching submitted url");
        match entityscan_media::download_video(&url, &video_path).await {
            Ok(()) => {
                if let Err(err) = state.store.set_paths(&video_id, Some(&video_path.to_string_lossy()), None).await {
                    error!(video_id = %video_id, error = %err, "failed to record fetched video path");
                    return;
                }
                if let Err(err) = enqueue(&state, video_id.clone()).await {
                    error!(video_id = %video_id, error = %err, "failed to enqueue fetched job");
                }
            }
            Err(err) => {
                warn!(video_id = %video_id, error = %err, "url fetch failed");
                // `queued` has no direct edge to `failed`; pass through
                // `processing` first so the status transition stays legal.
                let _ = state
                    .store
                    .update_status(&video_id, JobStatus::Processing, 0, Some("fetching"), None)
                    .await;
                let _ = state.store.finish_failed(&video_id, format!("fetch_failed:{err}")).await;
            }
        }
    });
}

async fn enqueue(state: &AppState, video_id: VideoId) -> ApiResult<()> {
    state.broker.enqueue(Task::new(video_id)).await?;
    crate::metrics::record_job_enqueued();
    Ok(())
}

/// `get_job(video_id)`: returns the full durable Job.
pub async fn get_job(State(state): State<AppState>, AxumPath(video_id): AxumPath<String>) -> ApiResult<Json<Job>> {
    let video_id = parse_video_id(&video_id)?;
    let job = state.store.get(&video_id).await?;
    Ok(Json(job))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    pub progress: u8,
    pub current_stage: Option<String>,
    pub status_text: Option<String>,
}

/// `get_status(video_id)`: safe to poll at 1-2 Hz.
pub async fn get_status(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<Json<StatusResponse>> {
    let video_id = parse_video_id(&video_id)?;
    let job = state.store.get(&video_id).await?;
    Ok(Json(StatusResponse {
        status: job.status,
        progress: job.progress,
        current_stage: job.current_stage,
        status_text: job.error,
    }))
}

/// `delete_job(video_id)`: removes all artifacts and the
/// record. Refuses to delete a job that is still actively processing and
/// not yet stale, mirroring the store's own guard.
pub async fn delete_job(State(state): State<AppState>, AxumPath(video_id): AxumPath<String>) -> ApiResult<Json<serde_json::Value>> {
    let video_id = parse_video_id(&video_id)?;
    let stale_after = chrono::Duration::from_std(state.pipeline.stale_after)
        .unwrap_or_else(|_| chrono::Duration::minutes(15));

    state.store.delete(&video_id, stale_after).await?;

    let data_dir = PathBuf::from(&state.pipeline.data_dir);
    let _ = tokio::fs::remove_dir_all(data_dir.join("videos").join(video_id.as_str())).await;
    let _ = tokio::fs::remove_dir_all(data_dir.join("frames").join(video_id.as_str())).await;
    let _ = tokio::fs::remove_dir_all(data_dir.join("reports").join(video_id.as_str())).await;
    state.index.remove_job(video_id).await;

    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub(crate) fn parse_video_id(raw: &str) -> ApiResult<VideoId> {
    if !security::is_valid_video_id(raw) {
        return Err(ApiError::bad_request("malformed video_id"));
    }
    Ok(VideoId::from(raw))
}
