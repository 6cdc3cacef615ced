//! # reefheatctl
//!
//! Operator entry point for the reefheat pipeline. Each subcommand maps onto
//! one driver in `reefheat-core`:
//!
//! - `precompute`: fit and ingest the climatology baselines (run once)
//! - `backfill`: resumable historical run over a date range
//! - `daily`: single-day update with warehouse insert
//! - `annual-max` / `annual-max-range`: yearly peak accumulated stress
//! - `load-warehouse`: push the local summary logs into the warehouse
//!
//! Configuration comes from `reefheat.toml` (see `--config`), `.env` and
//! `REEFHEAT_*` variables, in that order of precedence from lowest to highest.

mod config_loader;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use reefheat_core::warehouse::load_summary_dir;
use reefheat_core::{
    AnnualMaxDriver, BatchDriver, ClimatologyPrecompute, DailyRunner, DateRange,
    ExportDestination, FileCheckpointStore, HttpComputeClient, HttpWarehouseLoader,
    JsonlSummaryLog, PipelineConfig, RemoteJobClient, RunMode,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config_loader::{ConfigLoader, ConfigLoaderOptions};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "reefheatctl")]
#[command(about = "Coral heat-stress pipeline: climatology, backfill, daily and annual products")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct GlobalArgs {
    /// Path to the pipeline configuration file (TOML)
    #[arg(long, global = true, env = "REEFHEAT_CONFIG")]
    config: Option<PathBuf>,

    /// Path to a .env file loaded before reading the environment
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fit the monthly, maximum-monthly and daily baselines and ingest them
    Precompute,
    /// Process every day of an inclusive date range with checkpointing
    Backfill(BackfillArgs),
    /// Process a single day (defaults to yesterday, UTC)
    Daily(DailyArgs),
    /// Export the annual maximum of accumulated stress for one year
    AnnualMax {
        year: i32,
        #[arg(long, value_enum, default_value_t = Destination::Gcs)]
        dest: Destination,
    },
    /// Export annual maxima for an inclusive range of years
    AnnualMaxRange {
        first: i32,
        last: i32,
        #[arg(long, value_enum, default_value_t = Destination::Gcs)]
        dest: Destination,
    },
    /// Load every summary log in DIR into the warehouse table
    LoadWarehouse {
        /// Defaults to `output.summary_dir`
        dir: Option<PathBuf>,
    },
}

#[derive(ClapArgs, Debug, Clone)]
struct BackfillArgs {
    /// First day (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,

    /// Last day, inclusive (YYYY-MM-DD)
    #[arg(long)]
    end: NaiveDate,

    /// Skip days recorded in the checkpoint file
    #[arg(long, default_value_t = false)]
    resume: bool,

    /// Submit exports without computing summaries
    #[arg(long, conflicts_with = "stats_only", default_value_t = false)]
    export_only: bool,

    /// Compute summaries without submitting exports
    #[arg(long, default_value_t = false)]
    stats_only: bool,

    #[arg(long, value_enum, default_value_t = Destination::Gcs)]
    dest: Destination,
}

#[derive(ClapArgs, Debug, Clone)]
struct DailyArgs {
    /// Day to process (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long, value_enum, default_value_t = Destination::Gcs)]
    dest: Destination,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Destination {
    Gcs,
    Drive,
}

impl From<Destination> for ExportDestination {
    fn from(value: Destination) -> Self {
        match value {
            Destination::Gcs => ExportDestination::CloudStorage,
            Destination::Drive => ExportDestination::Drive,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,reqwest=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let load = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: cli.global.config.clone(),
        env_file: cli.global.env_file.clone(),
    })
    .load()
    .context("failed to load pipeline configuration")?;

    if load.env_file_loaded {
        info!("loaded .env file");
    }
    match &load.source {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => warn!("no configuration file found; running on defaults"),
    }
    let config = Arc::new(load.config);

    match cli.command {
        Command::Precompute => {
            let remote = compute_client(&config)?;
            let report = ClimatologyPrecompute::new(config, remote)
                .run()
                .await
                .context("climatology precompute failed")?;
            print_json(&report)
        }
        Command::Backfill(args) => run_backfill(config, args).await,
        Command::Daily(args) => run_daily(config, args).await,
        Command::AnnualMax { year, dest } => {
            let remote = compute_client(&config)?;
            let report = AnnualMaxDriver::new(config, remote)
                .run_year(year, dest.into())
                .await
                .with_context(|| format!("annual maximum for {year} failed"))?;
            print_json(&report)
        }
        Command::AnnualMaxRange { first, last, dest } => {
            let remote = compute_client(&config)?;
            let report = AnnualMaxDriver::new(config, remote)
                .run_range(first, last, dest.into())
                .await
                .with_context(|| format!("annual maxima {first}..={last} failed"))?;
            print_json(&report)
        }
        Command::LoadWarehouse { dir } => {
            let dir = dir.unwrap_or_else(|| config.output.summary_dir.clone());
            let loader = warehouse_loader(&config)?;
            let report = load_summary_dir(&dir, loader.as_ref(), &config.warehouse.table)
                .await
                .with_context(|| format!("failed to load summaries from {}", dir.display()))?;
            info!(
                files = report.files,
                rows = report.rows,
                row_errors = report.row_errors,
                skipped_files = report.skipped_files,
                table = %config.warehouse.table,
                "warehouse load finished"
            );
            Ok(())
        }
    }
}

async fn run_backfill(config: Arc<PipelineConfig>, args: BackfillArgs) -> anyhow::Result<()> {
    let range = DateRange::new(args.start, args.end).context("invalid backfill range")?;
    let mode = RunMode::from_flags(args.export_only, args.stats_only, args.resume, args.dest.into())
        .context("invalid backfill mode")?;

    let remote = compute_client(&config)?;
    let checkpoints = Arc::new(FileCheckpointStore::new(&config.output.checkpoint_path));
    let log = Arc::new(JsonlSummaryLog::new(&config.output.summary_dir));

    let report = BatchDriver::new(config, remote, checkpoints, log)
        .run(range, mode)
        .await
        .context("backfill stopped early")?;
    if report.errors > 0 {
        warn!(errors = report.errors, "some days failed; rerun with --resume to retry them");
    }
    print_json(&report)
}

async fn run_daily(config: Arc<PipelineConfig>, args: DailyArgs) -> anyhow::Result<()> {
    let date = match args.date {
        Some(date) => date,
        None => Utc::now()
            .date_naive()
            .pred_opt()
            .context("no day before today")?,
    };

    let remote = compute_client(&config)?;
    let log = Arc::new(JsonlSummaryLog::new(&config.output.summary_dir));
    let warehouse = warehouse_loader(&config)?;

    let outcome = DailyRunner::new(config, remote, log, warehouse)
        .with_destination(args.dest.into())
        .run(date)
        .await
        .with_context(|| format!("daily update for {date} failed"))?;
    print_json(&outcome)
}

fn compute_client(config: &PipelineConfig) -> anyhow::Result<Arc<dyn RemoteJobClient>> {
    let client = HttpComputeClient::new(
        &config.remote.endpoint,
        &config.remote.project,
        config.remote.request_timeout(),
    )
    .context("failed to build compute client")?;
    Ok(Arc::new(client))
}

fn warehouse_loader(config: &PipelineConfig) -> anyhow::Result<Arc<HttpWarehouseLoader>> {
    let loader = HttpWarehouseLoader::new(
        config.warehouse.endpoint.clone(),
        config.remote.request_timeout(),
    )
    .context("failed to build warehouse client")?;
    Ok(Arc::new(loader))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render report")?;
    println!("{rendered}");
    Ok(())
}
