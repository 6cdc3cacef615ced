use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::products::{ExportDestination, Product, ProductBuilder};
use crate::remote::{Expr, JobId, RegionReducer, RemoteJobClient};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnnualMaxReport {
    pub year: i32,
    pub job_id: JobId,
    /// Largest value anywhere in the region, when the reduction produced one.
    pub regional_max: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AnnualRangeReport {
    pub completed: Vec<AnnualMaxReport>,
    pub failed: Vec<i32>,
}

/// Exports the per-location maximum of daily accumulated stress for whole years.
///
/// No checkpointing: every call submits exactly one export per year.
pub struct AnnualMaxDriver {
    config: Arc<PipelineConfig>,
    remote: Arc<dyn RemoteJobClient>,
}

impl fmt::Debug for AnnualMaxDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnualMaxDriver")
            .field("remote", &"RemoteJobClient")
            .finish()
    }
}

impl AnnualMaxDriver {
    pub fn new(config: Arc<PipelineConfig>, remote: Arc<dyn RemoteJobClient>) -> Self {
        Self { config, remote }
    }

    pub async fn run_year(
        &self,
        year: i32,
        destination: ExportDestination,
    ) -> Result<AnnualMaxReport> {
        let builder = self.builder().await?;
        self.export_year(&builder, year, destination).await
    }

    /// Inclusive year range. A failing year is logged and the loop moves on.
    pub async fn run_range(
        &self,
        first: i32,
        last: i32,
        destination: ExportDestination,
    ) -> Result<AnnualRangeReport> {
        if last < first {
            return Err(PipelineError::Invalid(format!(
                "year range ends ({last}) before it starts ({first})"
            )));
        }
        let builder = self.builder().await?;
        let mut report = AnnualRangeReport::default();
        for year in first..=last {
            match self.export_year(&builder, year, destination).await {
                Ok(done) => report.completed.push(done),
                Err(err) if err.aborts_run() => return Err(err),
                Err(err) => {
                    warn!(year, error = %err, "annual maximum failed");
                    report.failed.push(year);
                }
            }
        }
        info!(
            first,
            last,
            completed = report.completed.len(),
            failed = report.failed.len(),
            "annual maximum range finished"
        );
        Ok(report)
    }

    async fn builder(&self) -> Result<ProductBuilder> {
        let context = PipelineContext::load(self.config.clone(), self.remote.as_ref()).await?;
        Ok(ProductBuilder::new(&context))
    }

    async fn export_year(
        &self,
        builder: &ProductBuilder,
        year: i32,
        destination: ExportDestination,
    ) -> Result<AnnualMaxReport> {
        info!(year, "computing annual maximum stress");
        let product = Product::AnnualMaxStress;
        let expression = builder.annual_max_stress(year)?;
        let stamp = NaiveDate::from_ymd_opt(year, 12, 31)
            .ok_or_else(|| PipelineError::Invalid(format!("year {year} out of range")))?;

        let request = builder.export_request(product, stamp, expression.clone(), destination);
        let job_id = self.remote.submit_export(request).await?;

        let named = Expr::Bands {
            bands: vec![(product.name().to_string(), expression)],
        };
        let output = self
            .remote
            .reduce_region(&named, RegionReducer::Max, builder.region())
            .await?;
        let regional_max = output.get(product.name());
        info!(year, job_id = %job_id, regional_max = ?regional_max, "annual maximum exported");

        Ok(AnnualMaxReport {
            year,
            job_id,
            regional_max,
        })
    }
}
