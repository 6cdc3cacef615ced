use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info};

use crate::baseline::{BaselineBuilder, MonthlySamples};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::grid::Raster;
use crate::remote::{AssetPath, Expr, JobId, JobState, RemoteJobClient, TemporalReducer};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IngestedAsset {
    pub path: AssetPath,
    pub job_id: JobId,
    pub bands: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PrecomputeReport {
    pub assets: Vec<IngestedAsset>,
    /// Yearly monthly-mean fields sampled from the source.
    pub samples: usize,
}

/// Computes the climatology baseline once and stores it as remote assets.
pub struct ClimatologyPrecompute {
    config: Arc<PipelineConfig>,
    remote: Arc<dyn RemoteJobClient>,
}

impl fmt::Debug for ClimatologyPrecompute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClimatologyPrecompute")
            .field("remote", &"RemoteJobClient")
            .finish()
    }
}

impl ClimatologyPrecompute {
    pub fn new(config: Arc<PipelineConfig>, remote: Arc<dyn RemoteJobClient>) -> Self {
        Self { config, remote }
    }

    /// Samples, builds, ingests, then waits until every ingestion finished.
    pub async fn run(&self) -> Result<PrecomputeReport> {
        let window = self.config.climatology.window();
        let builder = BaselineBuilder::new(window)?;

        let (samples, count) = self.sample_monthly_means().await?;
        info!(samples = count, "building climatology");
        let climatology = builder.build(&samples)?;

        let folder = self.config.asset_folder();
        let names = &self.config.climatology;
        let rasters = [
            (folder.join(&names.monthly_mean_asset), climatology.monthly_mean_raster()?),
            (
                folder.join(&names.max_monthly_mean_asset),
                climatology.max_monthly_mean_raster()?,
            ),
            (folder.join(&names.daily_asset), climatology.daily_raster()?),
        ];

        let mut assets = Vec::with_capacity(rasters.len());
        for (path, raster) in rasters {
            assets.push(self.ingest(path, &raster).await?);
        }
        self.wait_for_ingestion(&assets).await?;

        info!(folder = %folder, "climatology assets ready");
        Ok(PrecomputeReport {
            assets,
            samples: count,
        })
    }

    async fn sample_monthly_means(&self) -> Result<(MonthlySamples, usize)> {
        let window = self.config.climatology.window();
        let source = self.config.source();
        let region = self.config.region();
        let scale = Expr::constant(self.config.source.scale_factor);

        let mut samples = MonthlySamples::new();
        let mut count = 0;
        for month in 1..=12 {
            info!(month, "sampling monthly means");
            for year in window.years() {
                let (first, last) = month_bounds(year, month)?;
                let expression = Expr::Temporal {
                    source: source.clone(),
                    first,
                    last,
                    reducer: TemporalReducer::Mean,
                    body: Box::new(Expr::Current.multiply(scale.clone())),
                };
                let grid = self.remote.sample_field(&expression, &region).await?;
                samples.push(month, year, grid)?;
                count += 1;
            }
        }
        Ok((samples, count))
    }

    async fn ingest(&self, path: AssetPath, raster: &Raster) -> Result<IngestedAsset> {
        let region = self.config.region();
        let job_id = self.remote.ingest_raster(&path, raster, &region).await?;
        info!(asset = %path, job_id = %job_id, bands = raster.bands().len(), "ingestion started");
        Ok(IngestedAsset {
            path,
            job_id,
            bands: raster.bands().len(),
        })
    }

    async fn wait_for_ingestion(&self, assets: &[IngestedAsset]) -> Result<()> {
        let interval = self.config.climatology.poll_interval();
        loop {
            let mut states = Vec::with_capacity(assets.len());
            for asset in assets {
                states.push(self.remote.job_state(&asset.job_id).await?);
            }

            if let Some((asset, state)) = assets
                .iter()
                .zip(&states)
                .find(|(_, state)| matches!(state, JobState::Failed | JobState::Cancelled))
            {
                error!(
                    asset = %asset.path,
                    job_id = %asset.job_id,
                    state = %state,
                    "ingestion failed"
                );
                return Err(PipelineError::JobTerminated {
                    id: asset.job_id.clone(),
                    state: *state,
                });
            }
            if states.iter().all(|state| *state == JobState::Completed) {
                return Ok(());
            }

            info!(states = ?states, "waiting for ingestion");
            tokio::time::sleep(interval).await;
        }
    }
}

/// First and last day of a calendar month.
fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let invalid = || PipelineError::Invalid(format!("no calendar month {year}-{month:02}"));
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(invalid)?;
    let last = next.pred_opt().ok_or_else(invalid)?;
    Ok((first, last))
}
