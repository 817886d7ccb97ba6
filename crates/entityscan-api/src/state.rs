//! Application state.

use std::path::PathBuf;
use std::sync::Arc;

use entityscan_models::PipelineConfig;
use entityscan_queue::{open_broker, Broker, ProgressChannel};
use entityscan_store::{connect, JobStore, StoreConfig};
use entityscan_worker::SearchIndex;

use crate::config::ApiConfig;

/// Shared application state. Holds the same
/// store/broker/index the worker uses; the facade never touches pipeline
/// stages directly, only the durable record and the queue.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: PipelineConfig,
    pub store: JobStore,
    pub broker: Arc<dyn Broker>,
    pub progress: ProgressChannel,
    pub index: Arc<SearchIndex>,
}

impl AppState {
    /// Create new application state: opens the same state.db the worker
    /// writes to, rebuilds the search index from `reports/` on disk, and
    /// opens the configured broker.
    pub async fn new(config: ApiConfig, pipeline: PipelineConfig) -> anyhow::Result<Self> {
        let store_config = StoreConfig {
            database_url: pipeline.state_db_url.clone(),
            ..StoreConfig::default()
        };
        let pool = connect(&store_config).await?;
        let store = JobStore::new(pool);

        let index = Arc::new(SearchIndex::new(None));
        let reports_dir = PathBuf::from(&pipeline.data_dir).join("reports");
        if let Err(err) = index.rebuild_from_disk(&reports_dir).await {
            tracing::warn!(error = %err, "search index rebuild skipped (reports dir unreadable)");
        }

        let broker = open_broker(pipeline.broker_url.as_deref())?;
        let progress = ProgressChannel::new();

        Ok(Self { config, pipeline, store, broker, progress, index })
    }
}
