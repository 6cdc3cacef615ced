//! # Reefheat Core
//!
//! Core library for the reefheat pipeline, which turns a long daily series
//! of sea-surface temperature observations into derived heat-stress rasters
//! and confidence-bounded regional summaries, using a remote quota-limited
//! raster compute service.
//!
//! ## Overview
//!
//! - **Climatology baseline**: per-month trend regression evaluated at a
//!   fixed epoch, interpolated into a dense 366-day baseline
//! - **Batch driving**: resumable, checkpointed backfill that paces remote
//!   submissions against a bounded job queue
//! - **Summary statistics**: regional mean / std / 95% interval rows with
//!   explicit no-data semantics
//! - **Durable outputs**: year-partitioned JSONL logs and a warehouse loader
//!
//! ## Architecture
//!
//! - [`baseline`]: climatology fitting and interpolation
//! - [`remote`]: the compute service boundary and its HTTP adapter
//! - [`products`]: image-algebra expressions for every exported product
//! - [`summary`]: reduction output to [`summary::SummaryRow`]
//! - [`admission`]: queue backpressure
//! - [`checkpoint`] / [`summary_log`] / [`warehouse`]: persistence
//! - [`driver`]: backfill, daily, annual-maximum and precompute entry points
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chrono::NaiveDate;
//! use reefheat_core::{
//!     BatchDriver, DateRange, FileCheckpointStore, HttpComputeClient, JsonlSummaryLog,
//!     PipelineConfig, RunMode,
//! };
//!
//! async fn backfill_january() -> reefheat_core::Result<()> {
//!     let config = Arc::new(PipelineConfig::default());
//!     let remote = HttpComputeClient::new(
//!         &config.remote.endpoint,
//!         &config.remote.project,
//!         config.remote.request_timeout(),
//!     )?;
//!     let driver = BatchDriver::new(
//!         config.clone(),
//!         Arc::new(remote),
//!         Arc::new(FileCheckpointStore::new(&config.output.checkpoint_path)),
//!         Arc::new(JsonlSummaryLog::new(&config.output.summary_dir)),
//!     );
//!     let range = DateRange::new(
//!         NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!         NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
//!     )?;
//!     let report = driver.run(range, RunMode::default()).await?;
//!     println!("{} processed, {} errors", report.processed, report.errors);
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]

/// Queue backpressure against the remote job service
pub mod admission;

/// Climatology baseline: monthly trends, maximum monthly mean, daily interpolation
pub mod baseline;

/// Durable completed-unit checkpoint
pub mod checkpoint;

/// Pipeline configuration tree with defaults
pub mod config;

/// Resolved run context (config plus climatology handles)
pub mod context;

/// Backfill, daily, annual-maximum and precompute drivers
pub mod driver;

/// Error types and error handling utilities
pub mod error;

/// Local raster grids used by the baseline builder
pub mod grid;

/// Product expressions and export naming
pub mod products;

/// Remote compute service boundary
pub mod remote;

/// Confidence-bounded summary rows
pub mod summary;

/// Year-partitioned JSONL summary logs
pub mod summary_log;

/// Work units and date ranges
pub mod types;

/// Warehouse bulk loading
pub mod warehouse;

pub use admission::AdmissionController;
pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use driver::{
    AnnualMaxDriver, BatchDriver, BatchReport, ClimatologyPrecompute, DailyOutcome, DailyRunner,
    RunMode, RunOutputs,
};
pub use error::{ErrorClass, PipelineError, Result};
pub use products::{ExportDestination, Product, ProductBuilder};
pub use remote::{HttpComputeClient, JobId, JobState, QueueProbe, RemoteJobClient};
pub use summary::{SummaryRow, VariableSummary};
pub use summary_log::{InMemorySummaryLog, JsonlSummaryLog, SummaryLog};
pub use types::{DateRange, WorkUnit};
pub use warehouse::{HttpWarehouseLoader, WarehouseLoader, load_summary_dir};
