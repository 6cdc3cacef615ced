mod support;

use std::sync::Arc;
use std::time::Duration;

use reefheat_core::remote::{ExportTarget, JobState, RegionReducer};
use reefheat_core::summary::ReductionOutput;
use reefheat_core::{
    AnnualMaxDriver, ClimatologyPrecompute, ExportDestination, JobId, PipelineError,
};
use support::{FakeRemote, date, test_config};

fn max_output(value: f64) -> ReductionOutput {
    let mut output = ReductionOutput::default();
    output.insert("annual_max_dhw", Some(value));
    output
}

#[tokio::test]
async fn annual_maximum_exports_one_raster_and_reports_the_regional_max() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let remote = FakeRemote::new().with_reduction(max_output(8.25));

    let driver = AnnualMaxDriver::new(config, remote.clone());
    let report = driver
        .run_year(2024, ExportDestination::CloudStorage)
        .await
        .unwrap();

    assert_eq!(report.year, 2024);
    assert_eq!(report.regional_max, Some(8.25));
    let exports = remote.exports();
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].description, "annual_max_dhw_20241231");
    assert_eq!(
        exports[0].target,
        ExportTarget::CloudStorage {
            bucket: "coral-dhw-gbr".into(),
            object_prefix: "annual_max_dhw/2024/20241231".into(),
        }
    );
    assert_eq!(remote.reductions(), vec![RegionReducer::Max]);
}

#[tokio::test]
async fn annual_range_continues_past_a_failing_year() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let remote = FakeRemote::new().with_reduction(max_output(3.0));
    remote.fail_exports_on(date(2020, 12, 31));

    let driver = AnnualMaxDriver::new(config, remote.clone());
    let report = driver
        .run_range(2019, 2021, ExportDestination::Drive)
        .await
        .unwrap();

    let years: Vec<_> = report.completed.iter().map(|done| done.year).collect();
    assert_eq!(years, vec![2019, 2021]);
    assert_eq!(report.failed, vec![2020]);
    assert_eq!(remote.exports().len(), 2);
}

#[tokio::test]
async fn inverted_year_range_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let driver = AnnualMaxDriver::new(Arc::new(test_config(dir.path())), FakeRemote::new());
    let err = driver
        .run_range(2022, 2021, ExportDestination::CloudStorage)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Invalid(_)));
}

#[tokio::test(start_paused = true)]
async fn precompute_ingests_three_artifacts_and_waits_for_completion() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let remote = FakeRemote::new();
    remote.script_job_states(vec![vec![
        JobState::Running,
        JobState::Completed,
        JobState::Ready,
    ]]);

    let precompute = ClimatologyPrecompute::new(config, remote.clone());
    let started = tokio::time::Instant::now();
    let report = precompute.run().await.unwrap();

    // 12 months x 28 baseline years
    assert_eq!(remote.sampled(), 336);
    assert_eq!(report.samples, 336);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(30) && waited < Duration::from_secs(31));

    let ingested = remote.ingested();
    let names: Vec<_> = ingested.iter().map(|(path, _)| path.to_string()).collect();
    assert_eq!(
        names,
        [
            "projects/reefheat/assets/coral_dhw/mm_climatology",
            "projects/reefheat/assets/coral_dhw/mmm_climatology",
            "projects/reefheat/assets/coral_dhw/daily_climatology",
        ]
    );
    let band_counts: Vec<_> = ingested
        .iter()
        .map(|(_, raster)| raster.bands().len())
        .collect();
    assert_eq!(band_counts, [12, 1, 366]);

    // samples follow 20 + month + 0.1 * (year - 1985), so the fitted January
    // mean at the 1988.2857 epoch is 21.32857
    let mmm = ingested[1].1.band("mmm_sst").unwrap();
    let january = ingested[0].1.band("mm_01").unwrap();
    assert!((january.values()[0].unwrap() - 21.32857).abs() < 1e-6);
    assert!((mmm.values()[0].unwrap() - 32.32857).abs() < 1e-6);
    assert_eq!(mmm.values()[1], None);
}

#[tokio::test(start_paused = true)]
async fn failed_ingestion_names_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let remote = FakeRemote::new();
    remote.script_job_states(vec![
        vec![JobState::Running, JobState::Running, JobState::Running],
        vec![JobState::Completed, JobState::Completed, JobState::Failed],
    ]);

    let err = ClimatologyPrecompute::new(config, remote.clone())
        .run()
        .await
        .unwrap_err();

    match err {
        PipelineError::JobTerminated { id, state } => {
            assert_eq!(id, JobId("ingest-3".into()));
            assert_eq!(state, JobState::Failed);
        }
        other => panic!("unexpected error {other}"),
    }
}
