use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::baseline::BaselineWindow;
use crate::error::{PipelineError, Result};
use crate::remote::{AssetPath, Region, SourceRef};

/// Global knobs for every pipeline mode.
///
/// All sections carry defaults so a deployment only has to supply the
/// identifiers that are specific to it (project, bucket, endpoints).
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Compute gateway location and project scoping.
    pub remote: RemoteConfig,
    /// Region of interest and pixel scale, passed through opaquely.
    pub region: RegionConfig,
    /// Observation collection the daily products read.
    pub source: SourceConfig,
    /// Historical window and asset names of the climatology baseline.
    pub climatology: ClimatologyConfig,
    /// Rolling accumulated-stress parameters.
    pub stress: StressConfig,
    /// Remote queue ceiling and polling cadence.
    pub admission: AdmissionConfig,
    /// Batch size and inter-batch pause of the backfill driver.
    pub batch: BatchConfig,
    /// Local durable outputs and export destinations.
    pub output: OutputConfig,
    /// Warehouse endpoint and destination table.
    pub warehouse: WarehouseConfig,
}

impl PipelineConfig {
    /// Guard rails applied after all sources were merged.
    pub fn validate(&self) -> Result<()> {
        if self.remote.project.trim().is_empty() {
            return Err(PipelineError::Invalid("remote.project is empty".into()));
        }
        self.climatology.window().validate()?;
        let [west, south, east, north] = self.region.bounds;
        if !(west < east && south < north) {
            return Err(PipelineError::Invalid(format!(
                "region bounds {:?} are not [west, south, east, north]",
                self.region.bounds
            )));
        }
        if self.region.scale_m <= 0.0 {
            return Err(PipelineError::Invalid("region.scale_m must be positive".into()));
        }
        if self.stress.window_days == 0 {
            return Err(PipelineError::Invalid("stress.window_days must be > 0".into()));
        }
        if self.stress.normalizer <= 0.0 {
            return Err(PipelineError::Invalid("stress.normalizer must be positive".into()));
        }
        if self.batch.batch_size == 0 {
            return Err(PipelineError::Invalid("batch.batch_size must be > 0".into()));
        }
        if self.admission.max_queued_jobs == 0 {
            return Err(PipelineError::Invalid(
                "admission.max_queued_jobs must be > 0".into(),
            ));
        }
        // zero here turns a polling loop into a busy loop against the remote
        let durations = [
            ("admission.poll_interval_ms", self.admission.poll_interval_ms),
            ("climatology.poll_interval_ms", self.climatology.poll_interval_ms),
            ("batch.throttle_pause_ms", self.batch.throttle_pause_ms),
            ("remote.request_timeout_ms", self.remote.request_timeout_ms),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, ms)| *ms == 0) {
            return Err(PipelineError::Invalid(format!("{name} must be > 0")));
        }
        Ok(())
    }

    pub fn region(&self) -> Region {
        Region {
            bounds: self.region.bounds,
            scale: self.region.scale_m,
            max_pixels: self.region.max_pixels,
        }
    }

    pub fn source(&self) -> SourceRef {
        SourceRef {
            collection: self.source.collection.clone(),
            band: self.source.band.clone(),
        }
    }

    pub fn asset_folder(&self) -> AssetPath {
        AssetPath::new(format!(
            "projects/{}/assets/{}",
            self.remote.project, self.climatology.asset_folder
        ))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub endpoint: Url,
    pub project: String,
    pub request_timeout_ms: u64,
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse("http://127.0.0.1:8470/")
                .expect("static endpoint literal parses"),
            project: "reefheat".to_string(),
            request_timeout_ms: 120_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// `[west, south, east, north]` in degrees.
    pub bounds: [f64; 4],
    pub scale_m: f64,
    pub max_pixels: f64,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            bounds: [141.0958, -24.70584, 153.2032, -8.926405],
            scale_m: 27_830.0,
            max_pixels: 1e8,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub collection: String,
    pub band: String,
    /// Multiplier turning stored integers into physical units.
    pub scale_factor: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            collection: "NOAA/CDR/OISST/V2_1".to_string(),
            band: "sst".to_string(),
            scale_factor: 0.01,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimatologyConfig {
    pub first_year: i32,
    pub last_year: i32,
    pub target_epoch: f64,
    /// Folder below `projects/<project>/assets/`.
    pub asset_folder: String,
    pub monthly_mean_asset: String,
    pub max_monthly_mean_asset: String,
    pub daily_asset: String,
    /// Cadence for polling ingestion jobs during precompute.
    pub poll_interval_ms: u64,
}

impl ClimatologyConfig {
    pub fn window(&self) -> BaselineWindow {
        BaselineWindow {
            first_year: self.first_year,
            last_year: self.last_year,
            target_epoch: self.target_epoch,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ClimatologyConfig {
    fn default() -> Self {
        Self {
            first_year: 1985,
            last_year: 2012,
            target_epoch: 1988.2857,
            asset_folder: "coral_dhw".to_string(),
            monthly_mean_asset: "mm_climatology".to_string(),
            max_monthly_mean_asset: "mmm_climatology".to_string(),
            daily_asset: "daily_climatology".to_string(),
            poll_interval_ms: 30_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Length of the trailing accumulation window, including the day itself.
    pub window_days: u32,
    /// Excess below this level does not accumulate.
    pub threshold: f64,
    /// Divisor applied to the window sum (days per week).
    pub normalizer: f64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            window_days: 84,
            threshold: 1.0,
            normalizer: 7.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Ceiling on READY + RUNNING remote jobs.
    pub max_queued_jobs: usize,
    pub poll_interval_ms: u64,
}

impl AdmissionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_queued_jobs: 2_500,
            poll_interval_ms: 30_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Processed units between checkpoint saves and queue checks.
    pub batch_size: usize,
    pub throttle_pause_ms: u64,
}

impl BatchConfig {
    pub fn throttle_pause(&self) -> Duration {
        Duration::from_millis(self.throttle_pause_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            throttle_pause_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub summary_dir: PathBuf,
    pub checkpoint_path: PathBuf,
    pub bucket: String,
    pub drive_folder: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            summary_dir: PathBuf::from("summaries"),
            checkpoint_path: PathBuf::from("backfill_progress.json"),
            bucket: "coral-dhw-gbr".to_string(),
            drive_folder: "coral_dhw_exports".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub endpoint: Url,
    /// Fully qualified `project.dataset.table`.
    pub table: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse("http://127.0.0.1:8471/")
                .expect("static endpoint literal parses"),
            table: "reefheat.coral_dhw.daily_summary".to_string(),
        }
    }
}
