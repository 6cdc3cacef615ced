use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::products::{ExportDestination, ProductBuilder};
use crate::remote::{JobId, RemoteJobClient};
use crate::summary::SummaryRow;
use crate::summary_log::SummaryLog;
use crate::types::WorkUnit;
use crate::warehouse::WarehouseLoader;

use super::{submit_daily_exports, summarize};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyReport {
    /// The day actually processed; may be the day before the requested one.
    pub date: NaiveDate,
    pub job_ids: Vec<JobId>,
    pub summary: SummaryRow,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DailyOutcome {
    Processed(DailyReport),
    /// Neither the requested day nor the day before has an observation.
    NoData {
        requested: NaiveDate,
        fallback: NaiveDate,
    },
}

/// One scheduled invocation: exports, summary row, warehouse insert.
pub struct DailyRunner {
    config: Arc<PipelineConfig>,
    remote: Arc<dyn RemoteJobClient>,
    log: Arc<dyn SummaryLog>,
    warehouse: Arc<dyn WarehouseLoader>,
    destination: ExportDestination,
}

impl fmt::Debug for DailyRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DailyRunner")
            .field("remote", &"RemoteJobClient")
            .field("log", &"SummaryLog")
            .field("warehouse", &"WarehouseLoader")
            .field("destination", &self.destination)
            .finish()
    }
}

impl DailyRunner {
    pub fn new(
        config: Arc<PipelineConfig>,
        remote: Arc<dyn RemoteJobClient>,
        log: Arc<dyn SummaryLog>,
        warehouse: Arc<dyn WarehouseLoader>,
    ) -> Self {
        Self {
            config,
            remote,
            log,
            warehouse,
            destination: ExportDestination::CloudStorage,
        }
    }

    pub fn with_destination(mut self, destination: ExportDestination) -> Self {
        self.destination = destination;
        self
    }

    pub async fn run(&self, requested: NaiveDate) -> Result<DailyOutcome> {
        info!(date = %requested, "daily run");
        let Some(date) = self.resolve_date(requested).await? else {
            let fallback = previous_day(requested)?;
            warn!(requested = %requested, fallback = %fallback, "no observation available");
            return Ok(DailyOutcome::NoData {
                requested,
                fallback,
            });
        };

        let context = PipelineContext::load(self.config.clone(), self.remote.as_ref()).await?;
        let builder = ProductBuilder::new(&context);
        let unit = WorkUnit(date);
        let products = builder.daily(unit)?;

        let job_ids =
            submit_daily_exports(self.remote.as_ref(), &builder, &products, self.destination)
                .await?;
        info!(date = %unit, jobs = ?job_ids, "exports started");

        let summary = summarize(self.remote.as_ref(), &builder, &products).await?;
        info!(
            date = %unit,
            sst = ?summary.primary.mean(),
            anomaly = ?summary.anomaly.mean(),
            dhw = ?summary.accumulated_stress.mean(),
            "summary computed"
        );
        self.log.append(&summary).await?;
        self.insert_into_warehouse(&summary).await;

        Ok(DailyOutcome::Processed(DailyReport {
            date,
            job_ids,
            summary,
        }))
    }

    /// The requested day, or the day before when the source lags by a day.
    async fn resolve_date(&self, requested: NaiveDate) -> Result<Option<NaiveDate>> {
        let source = self.config.source();
        let region = self.config.region();
        if self
            .remote
            .query_availability(&source, requested, &region)
            .await?
        {
            return Ok(Some(requested));
        }

        let fallback = previous_day(requested)?;
        info!(requested = %requested, fallback = %fallback, "no data yet; trying previous day");
        let available = self
            .remote
            .query_availability(&source, fallback, &region)
            .await?;
        Ok(available.then_some(fallback))
    }

    /// The summary log already holds the row; a failed insert is only reported.
    async fn insert_into_warehouse(&self, row: &SummaryRow) {
        let table = &self.config.warehouse.table;
        let failure = match self
            .warehouse
            .insert_rows(table, std::slice::from_ref(row))
            .await
        {
            Ok(errors) if errors.is_empty() => {
                info!(table = %table, "summary row loaded");
                return;
            }
            Ok(errors) => format!("{errors:?}"),
            Err(err) => err.to_string(),
        };
        let json = serde_json::to_string(row).unwrap_or_default();
        warn!(table = %table, error = %failure, summary_json = %json, "warehouse insert failed");
    }
}

fn previous_day(date: NaiveDate) -> Result<NaiveDate> {
    WorkUnit(date)
        .previous()
        .map(|unit| unit.date())
        .ok_or_else(|| PipelineError::Invalid(format!("{date} has no previous day")))
}
