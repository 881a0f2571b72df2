//! `bomright` command-line entry point.
//!
//! ```text
//! bomright observe --metric max          # today's maxima -> max_obs/<today>.json
//! bomright forecast                      # today's forecasts -> forecasts/<today>.json
//! bomright reconcile --metric max        # max_obs + last 7 forecasts -> reconciled_max
//! bomright verify                        # check every city against the live bulletins
//! ```

use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use postgres::Client;

use bomright_service::analysis::{reconcile, select_window};
use bomright_service::collect::{CollectReport, Collector};
use bomright_service::config::AppConfig;
use bomright_service::ingest::{FetchCache, HttpBulletinSource};
use bomright_service::logging::{self, Component, LogLevel};
use bomright_service::model::{MetricKind, StoreError};
use bomright_service::store::{FsSnapshotStore, PgSnapshotStore, SnapshotStore};
use bomright_service::verify;

const FORECAST_FAMILY: &str = "forecasts";

#[derive(Parser, Debug)]
#[command(name = "bomright")]
#[command(about = "Track how BOM temperature forecasts compare with what happened")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "BOMRIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record the observed minimum or maximum for every city
    Observe {
        #[arg(long)]
        metric: MetricKind,
        /// Day the bulletin is read on (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Record the forecasts issued today for every city
    Forecast {
        /// Issuance day (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Compare stored forecasts with a stored observation snapshot
    Reconcile {
        #[arg(long)]
        metric: MetricKind,
        /// Observation day to reconcile (default: the latest day for the metric)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Number of forecast snapshots to compare
        #[arg(long)]
        window: Option<usize>,
        /// Ignore the newest forecast snapshot
        #[arg(long)]
        skip_latest: bool,
    },
    /// Check every configured city against the live bulletins
    Verify,
}

/// Where snapshot families live.
enum Backend {
    Files(PathBuf),
    Postgres(Arc<Mutex<Client>>),
}

impl Backend {
    fn open(config: &AppConfig) -> Result<Self, StoreError> {
        match &config.store.database_url {
            Some(url) => Ok(Backend::Postgres(PgSnapshotStore::connect(url)?)),
            None => Ok(Backend::Files(config.store.data_dir.clone())),
        }
    }

    fn family(&self, name: &str) -> Result<Box<dyn SnapshotStore>, StoreError> {
        match self {
            Backend::Files(dir) => Ok(Box::new(FsSnapshotStore::family(dir, name))),
            Backend::Postgres(client) => Ok(Box::new(PgSnapshotStore::new(client.clone(), name)?)),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logging::init_logger(cli.log_level, cli.log_file.as_deref()).map_err(|e| e as Box<dyn Error>)?;

    let config = AppConfig::load(cli.config.as_deref())?;
    let registry = config.city_registry()?;
    tracing::info!(
        component = %Component::System,
        "Loaded {} cities: {}",
        registry.len(),
        registry.codes().join(", ")
    );

    let source = HttpBulletinSource::new(
        &config.source.base_url,
        Duration::from_secs(config.source.timeout_secs),
        config.source.max_attempts,
        Duration::from_millis(config.source.backoff_ms),
    )?;

    match cli.command {
        Command::Observe { metric, date } => {
            let today = date.unwrap_or_else(|| config.today());
            let cache = FetchCache::new(&source);
            let report = Collector::new(&cache, registry.cities(), config.collect_options())
                .collect_observations(metric, today);

            let store = Backend::open(&config)?.family(metric.observation_family())?;
            save_report(store.as_ref(), &report)?;
        }
        Command::Forecast { date } => {
            let issuance = date.unwrap_or_else(|| config.today());
            let cache = FetchCache::new(&source);
            let report = Collector::new(&cache, registry.cities(), config.collect_options())
                .collect_forecasts(issuance);

            let store = Backend::open(&config)?.family(FORECAST_FAMILY)?;
            save_report(store.as_ref(), &report)?;
        }
        Command::Reconcile {
            metric,
            date,
            window,
            skip_latest,
        } => {
            let target = date.unwrap_or_else(|| metric.observation_day(config.today()));
            let key = target.format("%Y-%m-%d").to_string();
            let window_size = window.unwrap_or(config.reconcile.window_size);
            let skip_latest = skip_latest || config.reconcile.skip_latest;

            let backend = Backend::open(&config)?;
            let observations = backend.family(metric.observation_family())?.read_snapshot(&key)?;
            let forecasts = backend.family(FORECAST_FAMILY)?;
            let window = select_window(forecasts.as_ref(), window_size, skip_latest)?;
            tracing::info!(
                component = %Component::Recon,
                "Reconciling {} {} against forecasts issued {}..{}",
                metric,
                key,
                window.last().map(|s| s.key.as_str()).unwrap_or("-"),
                window.first().map(|s| s.key.as_str()).unwrap_or("-")
            );

            let output = reconcile(registry.cities(), &window, &observations, metric)?;
            let document = output.to_json()?;
            backend.family(metric.reconciled_family())?.write(&key, &document)?;
            println!("{}", document);
        }
        Command::Verify => {
            let cache = FetchCache::new(&source);
            let report = verify::run_verification(&cache, registry.cities(), config.collect.workers);
            verify::print_summary(&report);
        }
    }

    Ok(())
}

fn save_report(store: &dyn SnapshotStore, report: &CollectReport) -> Result<(), StoreError> {
    store.write_snapshot(&report.snapshot)?;
    tracing::info!(
        component = %Component::Store,
        "Saved snapshot {} ({} cities, {} omitted)",
        report.snapshot.key,
        report.collected(),
        report.failures.len()
    );
    Ok(())
}
