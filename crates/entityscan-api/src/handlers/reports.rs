//! `get_report(video_id)`.

use axum::extract::{Path as AxumPath, State};
use axum::Json;

use entityscan_models::{JobStatus, Report};

use crate::error::{ApiError, ApiResult};
use crate::handlers::jobs::parse_video_id;
use crate::state::AppState;

/// `get_report(video_id)`: returns the Report when `status = completed`,
/// fails with `NotReady` otherwise.
pub async fn get_report(State(state): State<AppState>, AxumPath(video_id): AxumPath<String>) -> ApiResult<Json<Report>> {
    let video_id = parse_video_id(&video_id)?;
    let job = state.store.get(&video_id).await?;

    if job.status != JobStatus::Completed {
        return Err(ApiError::not_ready(format!("job {video_id} is {}", job.status)));
    }

    let report_path = job
        .report_path
        .ok_or_else(|| ApiError::internal(format!("job {video_id} is completed but has no report_path")))?;

    let bytes = tokio::fs::read(&report_path)
        .await
        .map_err(|e| ApiError::internal(format!("failed to read report: {e}")))?;
    let report: Report =
        serde_json::from_slice(&bytes).map_err(|e| ApiError::internal(format!("corrupt report: {e}")))?;

    Ok(Json(report))
}
