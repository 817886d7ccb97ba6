#![deny(unreachable_patterns)]
//! Video ingestion worker.
//!
//! This crate turns a queued job into a persisted [`entityscan_models::Report`]:
//! - Detector capability plumbing (capability_table.rs)
//! - Per-frame multi-source fusion into confirmed detections (fusion.rs)
//! - Temporal aggregation into per-label entity summaries (aggregator.rs)
//! - Report assembly and atomic persistence, including frame overlays (report_assembler.rs)
//! - The rebuildable in-memory search index (indexer.rs)
//! - The stage driver that runs all of the above in order for one job (stage_driver.rs)

pub mod aggregator;
pub mod capability_table;
pub mod config;
pub mod error;
pub mod fusion;
pub mod indexer;
pub mod logging;
pub mod report_assembler;
pub mod stage_driver;

pub use capability_table::CapabilityTable;
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use indexer::SearchIndex;
pub use logging::JobLogger;
pub use report_assembler::ReportAssembler;
pub use stage_driver::{CancellationRegistry, StageDriver};
