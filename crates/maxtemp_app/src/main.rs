mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use maxtemp_core::MergeOutcome;
use maxtemp_engine::{
    CsvFileStore, DatasetStore, MaxTempTableParser, Pipeline, ReqwestFetcher, RunError,
    RunReport, SheetStore,
};
use maxtemp_logging::{mt_debug, mt_error, mt_info};

use crate::config::{AppConfig, Backend, Overrides};

/// Append today's PMD maximum temperatures to a wide per-station table.
#[derive(Debug, Parser)]
#[command(name = "maxtemp", version)]
struct Cli {
    /// CSV path, or spreadsheet name with `--backend sheet`.
    target: Option<String>,

    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// RON config file. Defaults to `maxtemp.ron` when present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Source page to scrape instead of the configured one.
    #[arg(long)]
    url: Option<String>,

    /// Observation date (YYYY-MM-DD). Defaults to the local date.
    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long, env = "MAXTEMP_SHEETS_TOKEN", hide_env_values = true)]
    sheets_token: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config.with_overrides(Overrides {
            target: cli.target,
            backend: cli.backend,
            source_url: cli.url,
            sheets_token: cli.sheets_token,
        }),
        Err(err) => {
            eprintln!("maxtemp: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    let level = match config.log.level_filter() {
        Ok(level) => level,
        Err(err) => {
            eprintln!("maxtemp: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    maxtemp_logging::initialize(config.log.destination(), level);

    let date = cli
        .date
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    match run(&config, date) {
        Ok(report) => {
            if let MergeOutcome::Merged(summary) = &report.outcome {
                mt_info!(
                    "Table now holds {} stations across {} dates (bootstrapped: {})",
                    report.stations_total,
                    report.dates_total,
                    summary.bootstrapped
                );
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            mt_error!("Run for {} failed: {:#}", date, err);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &AppConfig, date: NaiveDate) -> anyhow::Result<RunReport> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let fetcher = ReqwestFetcher::new(config.fetch_settings());
    let store: Box<dyn DatasetStore> = match config.backend {
        Backend::Csv => Box::new(CsvFileStore::new(config.file_store_settings()?)),
        Backend::Sheet => Box::new(SheetStore::new(config.sheet_settings()?)?),
    };
    mt_debug!("Dataset target: {}", store.describe());

    let pipeline = Pipeline {
        fetcher: &fetcher,
        parser: &MaxTempTableParser,
        store: store.as_ref(),
    };
    runtime
        .block_on(pipeline.run_once(&config.source_url, date))
        .map_err(|err| with_run_context(err, &config.source_url, &store.describe()))
}

/// Store failures name the dataset target; everything else names the source.
fn with_run_context(err: RunError, source_url: &str, target: &str) -> anyhow::Error {
    let context = match err {
        RunError::Store(_) => format!("dataset in {target}"),
        _ => format!("source {source_url}"),
    };
    anyhow::Error::new(err).context(context)
}
