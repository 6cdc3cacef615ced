//! Boundary to the remote raster compute/export service.
//!
//! The service owns job scheduling and the job lifecycle. The pipeline only
//! submits work, asks for aggregate queue depth, and runs small synchronous
//! reductions. [`HttpComputeClient`] speaks a JSON gateway; tests substitute
//! in-memory fakes.

pub mod expr;
pub mod http;

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::grid::{Grid, Raster};
use crate::summary::ReductionOutput;

pub use expr::{BinaryOp, Expr, RegionReducer, SourceRef, TemporalReducer};
pub use http::HttpComputeClient;

/// Opaque identifier returned when a remote job is accepted.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a remote job as reported by the service.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Accepted and waiting for a worker.
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Jobs in these states count against the remote queue ceiling.
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Ready | JobState::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobState::Ready => "READY",
            JobState::Running => "RUNNING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        };
        f.write_str(label)
    }
}

/// Path of a stored asset on the remote side.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetPath(pub String);

impl AssetPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn join(&self, name: &str) -> Self {
        Self(format!("{}/{}", self.0.trim_end_matches('/'), name))
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a loaded asset. Only metadata travels to the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageHandle {
    pub path: AssetPath,
    pub bands: Vec<String>,
}

impl ImageHandle {
    pub fn has_band(&self, band: &str) -> bool {
        self.bands.iter().any(|name| name == band)
    }
}

/// Axis-aligned region `[west, south, east, north]` plus pixel scale.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub bounds: [f64; 4],
    /// Pixel scale in metres.
    pub scale: f64,
    pub max_pixels: f64,
}

/// Where an export lands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportTarget {
    CloudStorage { bucket: String, object_prefix: String },
    Drive { folder: String, file_prefix: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub description: String,
    pub expression: Expr,
    pub target: ExportTarget,
    pub region: Region,
    pub cloud_optimized: bool,
}

#[async_trait]
pub trait QueueProbe: Send + Sync {
    /// Number of jobs currently READY or RUNNING.
    async fn active_count(&self) -> Result<usize>;
}

#[async_trait]
pub trait RemoteJobClient: QueueProbe {
    /// Starts an asynchronous export and returns the accepted job id.
    async fn submit_export(&self, request: ExportRequest) -> Result<JobId>;

    /// Synchronous regional reduction of a (possibly multi-band) expression.
    async fn reduce_region(
        &self,
        expression: &Expr,
        reducer: RegionReducer,
        region: &Region,
    ) -> Result<ReductionOutput>;

    async fn get_image(&self, asset: &AssetPath) -> Result<ImageHandle>;

    /// Whether the source has an observation for `date` inside `region`.
    async fn query_availability(
        &self,
        source: &SourceRef,
        date: NaiveDate,
        region: &Region,
    ) -> Result<bool>;

    /// Evaluates a single-band expression into a local grid.
    async fn sample_field(&self, expression: &Expr, region: &Region) -> Result<Grid>;

    /// Stores a locally computed raster as an asset; completes asynchronously.
    async fn ingest_raster(
        &self,
        asset: &AssetPath,
        raster: &Raster,
        region: &Region,
    ) -> Result<JobId>;

    async fn job_state(&self, id: &JobId) -> Result<JobState>;
}
