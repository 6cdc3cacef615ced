//! Everything a driver resolves once before it touches the first work unit.

use std::sync::Arc;

use tracing::info;

use crate::baseline::{MMM_BAND, daily_band};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::remote::{AssetPath, ImageHandle, Region, RemoteJobClient, SourceRef};
use crate::types::DAYS_IN_BASELINE;

/// Immutable run context: configuration plus the climatology handles.
#[derive(Clone, Debug)]
pub struct PipelineContext {
    config: Arc<PipelineConfig>,
    region: Region,
    source: SourceRef,
    max_monthly_mean: ImageHandle,
    daily_baseline: ImageHandle,
}

impl PipelineContext {
    /// Resolves the climatology assets. Any failure here is fatal for the run.
    pub async fn load<C>(config: Arc<PipelineConfig>, remote: &C) -> Result<Self>
    where
        C: RemoteJobClient + ?Sized,
    {
        let folder = config.asset_folder();
        let mmm_path = folder.join(&config.climatology.max_monthly_mean_asset);
        let daily_path = folder.join(&config.climatology.daily_asset);

        info!(folder = %folder, "loading climatology assets");
        let max_monthly_mean = fetch(remote, &mmm_path).await?;
        let daily_baseline = fetch(remote, &daily_path).await?;

        let context = Self::from_parts(config, max_monthly_mean, daily_baseline)?;
        info!("climatology loaded");
        Ok(context)
    }

    /// Builds a context from handles that were already resolved.
    pub fn from_parts(
        config: Arc<PipelineConfig>,
        max_monthly_mean: ImageHandle,
        daily_baseline: ImageHandle,
    ) -> Result<Self> {
        if !max_monthly_mean.has_band(MMM_BAND) {
            return Err(PipelineError::FatalInit(format!(
                "{} has no {MMM_BAND} band",
                max_monthly_mean.path
            )));
        }
        if let Some(missing) = (1..=DAYS_IN_BASELINE)
            .map(daily_band)
            .find(|band| !daily_baseline.has_band(band))
        {
            return Err(PipelineError::FatalInit(format!(
                "{} is missing band {missing}",
                daily_baseline.path
            )));
        }

        Ok(Self {
            region: config.region(),
            source: config.source(),
            config,
            max_monthly_mean,
            daily_baseline,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    pub fn max_monthly_mean(&self) -> &ImageHandle {
        &self.max_monthly_mean
    }

    pub fn daily_baseline(&self) -> &ImageHandle {
        &self.daily_baseline
    }
}

async fn fetch<C>(remote: &C, path: &AssetPath) -> Result<ImageHandle>
where
    C: RemoteJobClient + ?Sized,
{
    remote
        .get_image(path)
        .await
        .map_err(|err| PipelineError::FatalInit(format!("cannot load {path}: {err}")))
}
