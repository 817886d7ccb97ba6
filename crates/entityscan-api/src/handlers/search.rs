//! `search(q, similarity, min_presence, min_frames)`.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use entityscan_models::SearchResponse;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_similarity")]
    pub similarity: f64,
    #[serde(default)]
    pub min_presence: f64,
    #[serde(default)]
    pub min_frames: u32,
}

fn default_similarity() -> f64 {
    0.5
}

pub async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> ApiResult<Json<SearchResponse>> {
    let response = state
        .index
        .search(&query.q, query.similarity, query.min_presence, query.min_frames)
        .await;
    Ok(Json(response))
}
