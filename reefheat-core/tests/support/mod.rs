#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use reefheat_core::baseline::{MMM_BAND, daily_band};
use reefheat_core::config::PipelineConfig;
use reefheat_core::grid::{Grid, Raster};
use reefheat_core::remote::{
    AssetPath, ExportRequest, Expr, ImageHandle, JobId, JobState, QueueProbe, Region,
    RegionReducer, RemoteJobClient, SourceRef,
};
use reefheat_core::summary::ReductionOutput;
use reefheat_core::summary_log::SummaryLog;
use reefheat_core::warehouse::{RowError, WarehouseLoader};
use reefheat_core::{PipelineError, Result, SummaryRow, WorkUnit};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Defaults with every local output redirected into `dir`.
pub fn test_config(dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.output.summary_dir = dir.join("summaries");
    config.output.checkpoint_path = dir.join("backfill_progress.json");
    config
}

/// Reduction output with the same statistics for all three variables.
pub fn uniform_reduction(mean: f64, std: f64, count: f64) -> ReductionOutput {
    let mut output = ReductionOutput::default();
    for key in ["sst", "anomaly", "dhw"] {
        output.insert(format!("{key}_mean"), Some(mean));
        output.insert(format!("{key}_stdDev"), Some(std));
        output.insert(format!("{key}_count"), Some(count));
    }
    output
}

#[derive(Default)]
struct FakeState {
    reduction: ReductionOutput,
    failing_stamps: HashSet<String>,
    active_script: VecDeque<usize>,
    active_polls: usize,
    unavailable: HashSet<NaiveDate>,
    assets_missing: bool,
    exports: Vec<ExportRequest>,
    reductions: Vec<RegionReducer>,
    sampled: usize,
    ingested: Vec<(AssetPath, Raster)>,
    ingest_ids: Vec<JobId>,
    state_script: VecDeque<Vec<JobState>>,
    current_states: Vec<JobState>,
    next_id: usize,
}

/// In-memory stand-in for the compute service.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_reduction(self: Arc<Self>, output: ReductionOutput) -> Arc<Self> {
        self.state.lock().unwrap().reduction = output;
        self
    }

    /// Every export whose description ends with the stamp of `day` is rejected.
    pub fn fail_exports_on(&self, day: NaiveDate) {
        let stamp = WorkUnit(day).stamp();
        self.state.lock().unwrap().failing_stamps.insert(stamp);
    }

    /// Active counts returned in order; 0 once exhausted.
    pub fn script_active(&self, samples: &[usize]) {
        self.state.lock().unwrap().active_script.extend(samples);
    }

    pub fn mark_unavailable(&self, day: NaiveDate) {
        self.state.lock().unwrap().unavailable.insert(day);
    }

    pub fn drop_assets(&self) {
        self.state.lock().unwrap().assets_missing = true;
    }

    /// Job states per poll round, one entry per ingested asset in ingest order.
    /// Once exhausted, every job reports COMPLETED.
    pub fn script_job_states(&self, rounds: Vec<Vec<JobState>>) {
        self.state.lock().unwrap().state_script.extend(rounds);
    }

    pub fn exports(&self) -> Vec<ExportRequest> {
        self.state.lock().unwrap().exports.clone()
    }

    pub fn active_polls(&self) -> usize {
        self.state.lock().unwrap().active_polls
    }

    pub fn reductions(&self) -> Vec<RegionReducer> {
        self.state.lock().unwrap().reductions.clone()
    }

    pub fn sampled(&self) -> usize {
        self.state.lock().unwrap().sampled
    }

    pub fn ingested(&self) -> Vec<(AssetPath, Raster)> {
        self.state.lock().unwrap().ingested.clone()
    }

    fn next_id(state: &mut FakeState, prefix: &str) -> JobId {
        state.next_id += 1;
        JobId(format!("{prefix}-{}", state.next_id))
    }
}

#[async_trait]
impl QueueProbe for FakeRemote {
    async fn active_count(&self) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.active_polls += 1;
        Ok(state.active_script.pop_front().unwrap_or(0))
    }
}

#[async_trait]
impl RemoteJobClient for FakeRemote {
    async fn submit_export(&self, request: ExportRequest) -> Result<JobId> {
        let mut state = self.state.lock().unwrap();
        if state
            .failing_stamps
            .iter()
            .any(|stamp| request.description.ends_with(stamp.as_str()))
        {
            return Err(PipelineError::Remote(format!(
                "export {} rejected",
                request.description
            )));
        }
        state.exports.push(request);
        Ok(Self::next_id(&mut state, "export"))
    }

    async fn reduce_region(
        &self,
        _expression: &Expr,
        reducer: RegionReducer,
        _region: &Region,
    ) -> Result<ReductionOutput> {
        let mut state = self.state.lock().unwrap();
        state.reductions.push(reducer);
        Ok(state.reduction.clone())
    }

    async fn get_image(&self, asset: &AssetPath) -> Result<ImageHandle> {
        let state = self.state.lock().unwrap();
        if state.assets_missing {
            return Err(PipelineError::Remote(format!("asset {asset} not found")));
        }
        let bands = if asset.0.ends_with("mmm_climatology") {
            vec![MMM_BAND.to_string()]
        } else if asset.0.ends_with("daily_climatology") {
            (1..=366).map(daily_band).collect()
        } else {
            return Err(PipelineError::Remote(format!("asset {asset} not found")));
        };
        Ok(ImageHandle {
            path: asset.clone(),
            bands,
        })
    }

    async fn query_availability(
        &self,
        _source: &SourceRef,
        date: NaiveDate,
        _region: &Region,
    ) -> Result<bool> {
        Ok(!self.state.lock().unwrap().unavailable.contains(&date))
    }

    /// Two-cell field: `20 + month + 0.1 * (year - 1985)` and a masked cell.
    async fn sample_field(&self, expression: &Expr, _region: &Region) -> Result<Grid> {
        let Expr::Temporal { first, .. } = expression else {
            return Err(PipelineError::Remote("expected a temporal mean".into()));
        };
        self.state.lock().unwrap().sampled += 1;
        let value = 20.0 + f64::from(first.month()) + 0.1 * f64::from(first.year() - 1985);
        Grid::new(2, 1, vec![Some(value), None])
    }

    async fn ingest_raster(
        &self,
        asset: &AssetPath,
        raster: &Raster,
        _region: &Region,
    ) -> Result<JobId> {
        let mut state = self.state.lock().unwrap();
        state.ingested.push((asset.clone(), raster.clone()));
        let id = Self::next_id(&mut state, "ingest");
        state.ingest_ids.push(id.clone());
        Ok(id)
    }

    async fn job_state(&self, id: &JobId) -> Result<JobState> {
        let mut state = self.state.lock().unwrap();
        let index = state
            .ingest_ids
            .iter()
            .position(|known| known == id)
            .ok_or_else(|| PipelineError::Remote(format!("unknown job {id}")))?;

        // a poll round starts with the first asset
        if index == 0 {
            state.current_states = state.state_script.pop_front().unwrap_or_default();
        }
        Ok(state
            .current_states
            .get(index)
            .copied()
            .unwrap_or(JobState::Completed))
    }
}

/// Summary log that fails with a persistence error for one day, then delegates.
pub struct FailingLog<L> {
    inner: L,
    fail_on: NaiveDate,
}

impl<L> FailingLog<L> {
    pub fn new(inner: L, fail_on: NaiveDate) -> Self {
        Self { inner, fail_on }
    }
}

#[async_trait]
impl<L: SummaryLog> SummaryLog for FailingLog<L> {
    async fn append(&self, row: &SummaryRow) -> Result<()> {
        if row.date.date() == self.fail_on {
            return Err(PipelineError::persistence(
                "summaries",
                std::io::Error::other("disk full"),
            ));
        }
        self.inner.append(row).await
    }
}

/// Warehouse double that records inserted rows and optionally fails.
#[derive(Default)]
pub struct RecordingWarehouse {
    rows: Mutex<Vec<(String, SummaryRow)>>,
    fail: bool,
}

impl RecordingWarehouse {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<(String, SummaryRow)> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl WarehouseLoader for RecordingWarehouse {
    async fn insert_rows(&self, table: &str, rows: &[SummaryRow]) -> Result<Vec<RowError>> {
        if self.fail {
            return Err(PipelineError::Warehouse("table not found".into()));
        }
        self.rows
            .lock()
            .unwrap()
            .extend(rows.iter().map(|row| (table.to_string(), row.clone())));
        Ok(Vec::new())
    }
}
