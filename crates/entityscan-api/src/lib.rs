//! Axum HTTP facade exposing the ingestion pipeline's REST surface over
//! its durable state store, broker, and search index.
//!
//! This crate provides:
//! - `create_job`/`get_job`/`get_status`/`get_report`/`delete_job`
//! - `list_frames`/`nearest_frame` over the per-job frame index
//! - `search` over the rebuildable in-memory search index
//! - Rate limiting, CORS, security headers, and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
