//! Daily and annual raster products expressed as remote image algebra,
//! plus the naming of their exports.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::baseline::{MMM_BAND, daily_band};
use crate::config::{OutputConfig, StressConfig};
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::remote::{
    AssetPath, ExportRequest, ExportTarget, Expr, Region, SourceRef, TemporalReducer,
};
use crate::summary::Variable;
use crate::types::{DateRange, WorkUnit};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    Primary,
    Anomaly,
    AccumulatedStress,
    AnnualMaxStress,
}

impl Product {
    /// Name used for export descriptions and object prefixes.
    pub fn name(&self) -> &'static str {
        match self {
            Product::Primary => "sst",
            Product::Anomaly => "sst_anomaly",
            Product::AccumulatedStress => "dhw",
            Product::AnnualMaxStress => "annual_max_dhw",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where exported rasters go.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportDestination {
    #[default]
    CloudStorage,
    Drive,
}

impl ExportDestination {
    pub fn target(&self, output: &OutputConfig, product: Product, date: NaiveDate) -> ExportTarget {
        let stamp = WorkUnit(date).stamp();
        match self {
            ExportDestination::CloudStorage => ExportTarget::CloudStorage {
                bucket: output.bucket.clone(),
                object_prefix: format!("{}/{}/{stamp}", product.name(), date.year()),
            },
            ExportDestination::Drive => ExportTarget::Drive {
                folder: output.drive_folder.clone(),
                file_prefix: format!("{}_{stamp}", product.name()),
            },
        }
    }

    fn cloud_optimized(&self) -> bool {
        matches!(self, ExportDestination::CloudStorage)
    }
}

/// The three per-day products of one work unit.
#[derive(Clone, Debug, PartialEq)]
pub struct DailyProducts {
    pub unit: WorkUnit,
    pub primary: Expr,
    pub anomaly: Expr,
    pub accumulated_stress: Expr,
}

impl DailyProducts {
    pub fn iter(&self) -> impl Iterator<Item = (Product, &Expr)> {
        [
            (Product::Primary, &self.primary),
            (Product::Anomaly, &self.anomaly),
            (Product::AccumulatedStress, &self.accumulated_stress),
        ]
        .into_iter()
    }

    /// Stacked bands whose regional reduction feeds the summary row.
    pub fn summary_bands(&self) -> Expr {
        Expr::Bands {
            bands: vec![
                (Variable::Primary.key().to_string(), self.primary.clone()),
                (Variable::Anomaly.key().to_string(), self.anomaly.clone()),
                (
                    Variable::AccumulatedStress.key().to_string(),
                    self.accumulated_stress.clone(),
                ),
            ],
        }
    }
}

/// Builds product expressions from resolved climatology assets.
#[derive(Clone, Debug)]
pub struct ProductBuilder {
    source: SourceRef,
    scale_factor: f64,
    max_monthly_mean: AssetPath,
    daily_baseline: AssetPath,
    stress: StressConfig,
    region: Region,
    output: OutputConfig,
}

impl ProductBuilder {
    pub fn new(context: &PipelineContext) -> Self {
        let config = context.config();
        Self {
            source: context.source().clone(),
            scale_factor: config.source.scale_factor,
            max_monthly_mean: context.max_monthly_mean().path.clone(),
            daily_baseline: context.daily_baseline().path.clone(),
            stress: config.stress,
            region: *context.region(),
            output: config.output.clone(),
        }
    }

    /// Source observation of the day in physical units.
    pub fn primary(&self, unit: WorkUnit) -> Expr {
        Expr::Observation {
            source: self.source.clone(),
            date: unit.date(),
        }
        .multiply(Expr::constant(self.scale_factor))
    }

    /// Primary minus the daily baseline of the unit's day of year.
    pub fn anomaly(&self, unit: WorkUnit) -> Expr {
        let baseline = Expr::asset(
            self.daily_baseline.clone(),
            Some(daily_band(unit.baseline_day())),
        );
        self.primary(unit).subtract(baseline)
    }

    /// Trailing-window sum of thresholded hotspots, divided by the normalizer.
    ///
    /// Windows reaching before the first observation are summed over what
    /// exists.
    pub fn accumulated_stress(&self, unit: WorkUnit) -> Result<Expr> {
        let window = DateRange::trailing(unit.date(), self.stress.window_days)?;
        let hotspot = Expr::Current
            .multiply(Expr::constant(self.scale_factor))
            .subtract(Expr::asset(
                self.max_monthly_mean.clone(),
                Some(MMM_BAND.to_string()),
            ))
            .max(Expr::constant(0.0))
            .threshold(self.stress.threshold, 0.0);

        Ok(Expr::Temporal {
            source: self.source.clone(),
            first: window.start(),
            last: window.end(),
            reducer: TemporalReducer::Sum,
            body: Box::new(hotspot),
        }
        .divide(Expr::constant(self.stress.normalizer)))
    }

    pub fn daily(&self, unit: WorkUnit) -> Result<DailyProducts> {
        Ok(DailyProducts {
            unit,
            primary: self.primary(unit),
            anomaly: self.anomaly(unit),
            accumulated_stress: self.accumulated_stress(unit)?,
        })
    }

    /// Per-location maximum of the daily accumulated stress over a calendar year.
    pub fn annual_max_stress(&self, year: i32) -> Result<Expr> {
        let inputs = DateRange::year(year)?
            .units()
            .map(|unit| self.accumulated_stress(unit))
            .collect::<Result<Vec<_>>>()?;
        if inputs.is_empty() {
            return Err(PipelineError::Invalid(format!("year {year} has no days")));
        }
        Ok(Expr::MaxOf { inputs })
    }

    /// Export request for `product` stamped with `date`.
    pub fn export_request(
        &self,
        product: Product,
        date: NaiveDate,
        expression: Expr,
        destination: ExportDestination,
    ) -> ExportRequest {
        ExportRequest {
            description: format!("{}_{}", product.name(), WorkUnit(date).stamp()),
            expression,
            target: destination.target(&self.output, product, date),
            region: self.region,
            cloud_optimized: destination.cloud_optimized(),
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }
}
