//! `list_frames`/`nearest_frame`.

use axum::extract::{Path as AxumPath, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use entityscan_models::Frame;

use crate::error::{ApiError, ApiResult};
use crate::handlers::jobs::parse_video_id;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct ListFramesQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub annotated: Option<bool>,
    pub entity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListFramesResponse {
    pub frames: Vec<Frame>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

async fn load_frames(state: &AppState, video_id: &entityscan_models::VideoId) -> ApiResult<Vec<Frame>> {
    let job = state.store.get(video_id).await?;
    let frames_dir = job
        .frames_dir
        .ok_or_else(|| ApiError::not_ready(format!("job {video_id} has no frames yet")))?;
    let path = std::path::Path::new(&frames_dir).join("frames.json");
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::not_ready(format!("job {video_id} has no frames yet")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::internal(format!("corrupt frames index: {e}")))
}

fn filter_frames(frames: Vec<Frame>, annotated: Option<bool>, entity: Option<&str>) -> Vec<Frame> {
    frames
        .into_iter()
        .filter(|f| match annotated {
            Some(true) => f.annotated_path.is_some(),
            Some(false) => f.annotated_path.is_none(),
            None => true,
        })
        .filter(|f| entity.map(|label| f.contains_label(&entityscan_models::normalize_label(label))).unwrap_or(true))
        .collect()
}

/// `list_frames(video_id, page, pageSize, annotated?, entity?)`: pageable;
/// when `entity` is set, returns only frames whose detections contain
/// that label.
pub async fn list_frames(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
    Query(query): Query<ListFramesQuery>,
) -> ApiResult<Json<ListFramesResponse>> {
    let video_id = parse_video_id(&video_id)?;
    let frames = load_frames(&state, &video_id).await?;
    let filtered = filter_frames(frames, query.annotated, query.entity.as_deref());

    let total = filtered.len() as u64;
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
    let start = ((page - 1) as usize) * (page_size as usize);
    let page_frames = filtered.into_iter().skip(start).take(page_size as usize).collect();

    Ok(Json(ListFramesResponse { frames: page_frames, page, page_size, total }))
}

#[derive(Debug, Deserialize)]
pub struct NearestFrameQuery {
    pub timestamp_sec: f64,
    pub page_size: Option<u32>,
    pub entity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NearestFrameResponse {
    pub page: u32,
    pub page_size: u32,
    pub frame: Frame,
}

/// `nearest_frame(video_id, timestamp_sec, entity?)`: returns the page and
/// frame whose timestamp is closest (ties -> earlier) and, if `entity` is
/// set, whose frame contains that entity.
pub async fn nearest_frame(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
    Query(query): Query<NearestFrameQuery>,
) -> ApiResult<Json<NearestFrameResponse>> {
    let video_id = parse_video_id(&video_id)?;
    let frames = load_frames(&state, &video_id).await?;
    let filtered = filter_frames(frames, None, query.entity.as_deref());

    if filtered.is_empty() {
        return Err(ApiError::not_found(format!("job {video_id} has no matching frames")));
    }

    let target = query.timestamp_sec;
    let mut best_pos = 0usize;
    let mut best_delta = f64::MAX;
    for (pos, frame) in filtered.iter().enumerate() {
        let delta = (frame.timestamp_sec - target).abs();
        // Strict `<` keeps the earlier frame on exact ties, since frames
        // are stored in ascending timestamp order.
        if delta < best_delta {
            best_delta = delta;
            best_pos = pos;
        }
    }

    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
    let page = (best_pos as u32 / page_size) + 1;
    let frame = filtered.into_iter().nth(best_pos).expect("best_pos is within bounds");

    Ok(Json(NearestFrameResponse { page, page_size, frame }))
}
