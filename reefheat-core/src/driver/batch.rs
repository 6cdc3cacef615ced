use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::admission::AdmissionController;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::PipelineConfig;
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::products::{ExportDestination, ProductBuilder};
use crate::remote::{JobId, RemoteJobClient};
use crate::summary::SummaryRow;
use crate::summary_log::SummaryLog;
use crate::types::{DateRange, WorkUnit};

use super::{submit_daily_exports, summarize};

/// Which outputs a backfill produces per unit.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutputs {
    /// Raster exports and summary rows.
    #[default]
    Both,
    ExportOnly,
    StatsOnly,
}

impl RunOutputs {
    pub fn exports(&self) -> bool {
        !matches!(self, RunOutputs::StatsOnly)
    }

    pub fn summaries(&self) -> bool {
        !matches!(self, RunOutputs::ExportOnly)
    }
}

impl fmt::Display for RunOutputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunOutputs::Both => "export + stats",
            RunOutputs::ExportOnly => "export only",
            RunOutputs::StatsOnly => "stats only",
        })
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RunMode {
    pub outputs: RunOutputs,
    /// Continue from the persisted checkpoint instead of starting empty.
    pub resume: bool,
    pub destination: ExportDestination,
}

impl RunMode {
    /// Builds a mode from operator flags; export-only and stats-only exclude each other.
    pub fn from_flags(
        export_only: bool,
        stats_only: bool,
        resume: bool,
        destination: ExportDestination,
    ) -> Result<Self> {
        let outputs = match (export_only, stats_only) {
            (true, true) => {
                return Err(PipelineError::Invalid(
                    "export-only and stats-only are mutually exclusive".into(),
                ));
            }
            (true, false) => RunOutputs::ExportOnly,
            (false, true) => RunOutputs::StatsOnly,
            (false, false) => RunOutputs::Both,
        };
        Ok(Self {
            outputs,
            resume,
            destination,
        })
    }
}

/// Totals of one backfill run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Units attempted in this run, successful or not.
    pub processed: usize,
    /// Units skipped because an earlier run completed them.
    pub skipped: usize,
    pub errors: usize,
    pub failed: Vec<WorkUnit>,
    /// Size of the completed set after the final save.
    pub completed_total: usize,
}

/// Sequential, checkpointed iteration over a date range.
pub struct BatchDriver {
    config: Arc<PipelineConfig>,
    remote: Arc<dyn RemoteJobClient>,
    checkpoints: Arc<dyn CheckpointStore>,
    log: Arc<dyn SummaryLog>,
    admission: AdmissionController,
}

impl fmt::Debug for BatchDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchDriver")
            .field("remote", &"RemoteJobClient")
            .field("checkpoints", &"CheckpointStore")
            .field("log", &"SummaryLog")
            .field("admission", &self.admission)
            .finish()
    }
}

impl BatchDriver {
    pub fn new(
        config: Arc<PipelineConfig>,
        remote: Arc<dyn RemoteJobClient>,
        checkpoints: Arc<dyn CheckpointStore>,
        log: Arc<dyn SummaryLog>,
    ) -> Self {
        let admission = AdmissionController::from_config(&config.admission);
        Self {
            config,
            remote,
            checkpoints,
            log,
            admission,
        }
    }

    /// Runs the backfill. Returns `Err` only when the run had to stop early:
    /// startup failures and persistence failures. Per-unit failures are
    /// counted in the report.
    pub async fn run(&self, range: DateRange, mode: RunMode) -> Result<BatchReport> {
        let checkpoint = if mode.resume {
            self.checkpoints.load().await?
        } else {
            Checkpoint::default()
        };
        let context = PipelineContext::load(self.config.clone(), self.remote.as_ref()).await?;
        let builder = ProductBuilder::new(&context);

        info!(
            start = %range.start(),
            end = %range.end(),
            days = range.day_count(),
            mode = %mode.outputs,
            destination = ?mode.destination,
            "backfill starting"
        );
        if mode.resume && !checkpoint.is_empty() {
            info!(completed = checkpoint.len(), "resuming from checkpoint");
        }

        let mut completed = checkpoint.completed;
        let mut report = BatchReport::default();
        let batch_size = self.config.batch.batch_size;
        let mut in_batch = 0usize;

        for unit in range.units() {
            if completed.contains(&unit) {
                report.skipped += 1;
                continue;
            }
            report.processed += 1;
            in_batch += 1;
            let progress = (progress_percent(&range, unit) * 10.0).round() / 10.0;

            match self.process_unit(&builder, unit, mode).await {
                Ok(UnitResult { row, job_ids }) => {
                    match &row {
                        Some(row) => info!(
                            date = %unit,
                            progress,
                            sst = ?row.primary.mean(),
                            anomaly = ?row.anomaly.mean(),
                            dhw = ?row.accumulated_stress.mean(),
                            "unit summarised"
                        ),
                        None => info!(
                            date = %unit,
                            progress,
                            jobs = job_ids.len(),
                            "unit exported"
                        ),
                    }
                    completed.insert(unit);
                }
                Err(err) if err.aborts_run() => {
                    error!(date = %unit, error = %err, "aborting backfill");
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        date = %unit,
                        progress,
                        error = %err,
                        "unit failed"
                    );
                    report.errors += 1;
                    report.failed.push(unit);
                }
            }

            if in_batch >= batch_size {
                in_batch = 0;
                self.save(&completed, unit.date()).await?;
                if mode.outputs.exports() {
                    self.pace(&report).await;
                } else {
                    info!(
                        processed = report.processed,
                        errors = report.errors,
                        "batch checkpoint"
                    );
                }
            }
        }

        self.save(&completed, range.end()).await?;
        report.completed_total = completed.len();
        info!(
            processed = report.processed,
            skipped = report.skipped,
            errors = report.errors,
            "backfill complete"
        );
        Ok(report)
    }

    async fn process_unit(
        &self,
        builder: &ProductBuilder,
        unit: WorkUnit,
        mode: RunMode,
    ) -> Result<UnitResult> {
        let products = builder.daily(unit)?;
        let remote = self.remote.as_ref();

        let job_ids = if mode.outputs.exports() {
            submit_daily_exports(remote, builder, &products, mode.destination).await?
        } else {
            Vec::new()
        };

        let row = if mode.outputs.summaries() {
            let row = summarize(remote, builder, &products).await?;
            self.log.append(&row).await?;
            Some(row)
        } else {
            None
        };

        Ok(UnitResult { row, job_ids })
    }

    async fn save(&self, completed: &BTreeSet<WorkUnit>, last_date: NaiveDate) -> Result<()> {
        let checkpoint = Checkpoint {
            completed: completed.clone(),
            last_date: Some(last_date),
        };
        self.checkpoints.save(&checkpoint).await
    }

    /// Batch-boundary pacing: wait for queue space when saturated, else a short pause.
    async fn pace(&self, report: &BatchReport) {
        let ceiling = self.admission.ceiling();
        let active = match self.remote.active_count().await {
            Ok(active) => active,
            Err(err) => {
                warn!(error = %err, "queue depth unavailable; pausing instead");
                tokio::time::sleep(self.config.batch.throttle_pause()).await;
                return;
            }
        };
        info!(
            processed = report.processed,
            active,
            errors = report.errors,
            "batch checkpoint"
        );

        if self.admission.is_saturated(active) {
            info!(active, ceiling, "remote queue saturated");
            if let Err(err) = self
                .admission
                .ensure_capacity(self.remote.as_ref(), ceiling)
                .await
            {
                warn!(error = %err, "queue depth lost while waiting; pausing instead");
                tokio::time::sleep(self.config.batch.throttle_pause()).await;
            }
        } else {
            tokio::time::sleep(self.config.batch.throttle_pause()).await;
        }
    }
}

struct UnitResult {
    row: Option<SummaryRow>,
    job_ids: Vec<JobId>,
}

fn progress_percent(range: &DateRange, unit: WorkUnit) -> f64 {
    let elapsed = (unit.date() - range.start()).num_days() + 1;
    elapsed as f64 / range.day_count() as f64 * 100.0
}
