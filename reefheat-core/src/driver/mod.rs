//! Entry points that turn configuration and collaborators into runs.
//!
//! - [`BatchDriver`]: resumable, admission-paced backfill over a date range.
//! - [`DailyRunner`]: the scheduled single-day invocation.
//! - [`AnnualMaxDriver`]: per-year maximum of accumulated stress.
//! - [`ClimatologyPrecompute`]: one-off baseline computation and ingestion.

mod annual;
mod batch;
mod daily;
mod precompute;

pub use annual::{AnnualMaxDriver, AnnualMaxReport, AnnualRangeReport};
pub use batch::{BatchDriver, BatchReport, RunMode, RunOutputs};
pub use daily::{DailyOutcome, DailyReport, DailyRunner};
pub use precompute::{ClimatologyPrecompute, IngestedAsset, PrecomputeReport};

use crate::error::Result;
use crate::products::{DailyProducts, ExportDestination, ProductBuilder};
use crate::remote::{JobId, RegionReducer, RemoteJobClient};
use crate::summary::SummaryRow;

/// Submits the three daily exports in product order.
async fn submit_daily_exports(
    remote: &dyn RemoteJobClient,
    builder: &ProductBuilder,
    products: &DailyProducts,
    destination: ExportDestination,
) -> Result<Vec<JobId>> {
    let mut job_ids = Vec::with_capacity(3);
    for (product, expression) in products.iter() {
        let request =
            builder.export_request(product, products.unit.date(), expression.clone(), destination);
        job_ids.push(remote.submit_export(request).await?);
    }
    Ok(job_ids)
}

/// Synchronous regional reduction of the three products into one row.
async fn summarize(
    remote: &dyn RemoteJobClient,
    builder: &ProductBuilder,
    products: &DailyProducts,
) -> Result<SummaryRow> {
    let output = remote
        .reduce_region(
            &products.summary_bands(),
            RegionReducer::MeanStdDevCount,
            builder.region(),
        )
        .await?;
    Ok(SummaryRow::reduce(products.unit, &output))
}
