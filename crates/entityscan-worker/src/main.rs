//! Video ingestion worker binary: dequeues tasks, runs the Stage Driver
//! for each, and sweeps stale `processing` jobs back to `queued` at
//! startup.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use entityscan_media::FfmpegFrameExtractor;
use entityscan_queue::{open_broker, Broker, ProgressChannel};
use entityscan_store::{connect, JobStore, StoreConfig};
use entityscan_worker::{CancellationRegistry, CapabilityTable, SearchIndex, StageDriver, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive("entityscan=info".parse().unwrap()))
        .init();

    info!("starting entityscan-worker");

    let config = WorkerConfig::from_env();
    info!(?config, "worker config loaded");

    if let Err(err) = run(config).await {
        error!(error = %err, "worker exited with error");
        std::process::exit(1);
    }
}

async fn run(config: WorkerConfig) -> anyhow::Result<()> {
    let pipeline = config.pipeline.clone();

    let store_config = StoreConfig {
        database_url: pipeline.state_db_url.clone(),
        ..StoreConfig::default()
    };
    let pool = connect(&store_config).await?;
    let store = JobStore::new(pool);

    let stale_after = chrono::Duration::from_std(pipeline.stale_after)
        .unwrap_or_else(|_| chrono::Duration::minutes(15));
    let recovered = store.recover_stale_processing(stale_after).await?;
    for video_id in &recovered {
        warn!(video_id = %video_id, "reset stale processing job to queued at startup");
        remove_job_artifacts(&pipeline.data_dir, video_id).await;
    }

    let reports_dir = PathBuf::from(&pipeline.data_dir).join("reports");
    let index = Arc::new(SearchIndex::new(None));
    if let Err(err) = index.rebuild_from_disk(&reports_dir).await {
        warn!(error = %err, "search index rebuild skipped (reports dir unreadable)");
    }

    let extractor = FfmpegFrameExtractor::new(
        pipeline.smart_sampling_diff_threshold,
        pipeline.smart_sampling_min_keep,
    )?;
    let capabilities = Arc::new(CapabilityTable::new(Arc::new(extractor)));

    let progress = ProgressChannel::new();
    let cancellation = Arc::new(CancellationRegistry::new());

    let driver = Arc::new(StageDriver::new(
        store,
        progress,
        capabilities,
        pipeline,
        config.stage_timeout,
        index,
        cancellation,
    ));

    let broker: Arc<dyn Broker> = open_broker(config.pipeline.broker_url.as_deref())?;

    let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs));
    let mut shutdown = std::pin::pin!(tokio::signal::ctrl_c());

    loop {
        let delivery = tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown signal received, draining in-flight jobs");
                break;
            }
            result = broker.dequeue() => result?,
        };

        let Some(delivery) = delivery else {
            info!("broker closed, shutting down");
            break;
        };

        let permit = permits.clone().acquire_owned().await?;
        let driver = driver.clone();
        let broker = broker.clone();

        tokio::spawn(async move {
            let video_id = delivery.task.video_id.clone();
            let outcome = driver.run_job(video_id.clone()).await;
            match outcome {
                Ok(()) => {
                    if let Err(err) = broker.ack(&delivery).await {
                        error!(video_id = %video_id, error = %err, "failed to ack task");
                    }
                }
                Err(err) => {
                    error!(video_id = %video_id, error = %err, "stage driver returned an error, nacking");
                    if let Err(err) = broker.nack(delivery).await {
                        error!(video_id = %video_id, error = %err, "failed to nack task");
                    }
                }
            }
            drop(permit);
        });
    }

    info!("entityscan-worker shutdown complete");
    Ok(())
}

async fn remove_job_artifacts(data_dir: &str, video_id: &entityscan_models::VideoId) {
    let frames_dir = PathBuf::from(data_dir).join("frames").join(video_id.as_str());
    let reports_dir = PathBuf::from(data_dir).join("reports").join(video_id.as_str());
    let _ = tokio::fs::remove_dir_all(&frames_dir).await;
    let _ = tokio::fs::remove_dir_all(&reports_dir).await;
}
