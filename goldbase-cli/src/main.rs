//! Goldbase CLI: update, status, and chart commands.
//!
//! Commands:
//! - `update`: reconcile the dataset against a config's window and export chart data
//! - `status`: report per-symbol coverage of a persisted dataset
//! - `chart`: export chart data from a persisted dataset without fetching

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use goldbase_core::chart::{ChartExport, ChartRequest, RangePreset};
use goldbase_core::config::{default_baselines, CHART_FILE, DATASET_FILE};
use goldbase_core::data::{PriceFetcher, SyntheticProvider, YahooProvider};
use goldbase_core::gbi::DEFAULT_REFERENCE;
use goldbase_core::reconcile::StdoutProgress;
use goldbase_core::{run_report, DatasetStore, RawReportConfig, ReportOutcome};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "goldbase",
    about = "Goldbase CLI: equity prices measured in gold"
)]
struct Cli {
    /// Log filter (e.g. info, debug, goldbase_core=trace). RUST_LOG wins if set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the dataset against the configured window, save it, and export chart data.
    Update {
        /// Path to a TOML or JSON report config.
        #[arg(long)]
        config: PathBuf,

        /// Override the configured symbols.
        #[arg(long, num_args = 1..)]
        symbols: Option<Vec<String>>,

        /// Override the start date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        /// Override the end date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Use the deterministic synthetic provider instead of Yahoo Finance.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Fetch symbols concurrently.
        #[arg(long, default_value_t = false)]
        parallel: bool,
    },
    /// Report per-symbol coverage of a persisted dataset.
    Status {
        /// Dataset file. Defaults to ./assets/data/all_gbi_data.csv.
        #[arg(long, default_value_os_t = default_data_file())]
        data_file: PathBuf,
    },
    /// Export chart data from a persisted dataset.
    Chart {
        /// Dataset file. Defaults to ./assets/data/all_gbi_data.csv.
        #[arg(long, default_value_os_t = default_data_file())]
        data_file: PathBuf,

        /// Date range preset: 7d, 30d, 3m, 6m, 1y, mtd, ytd, all.
        #[arg(long, default_value = "all")]
        range: String,

        /// Symbols to plot. Defaults to every symbol in the dataset.
        #[arg(long, num_args = 1..)]
        symbols: Option<Vec<String>>,

        /// Symbols drawn with emphasis. Defaults to GLD, QQQ, SPY.
        #[arg(long, num_args = 1..)]
        baselines: Option<Vec<String>>,

        /// Gold proxy the dataset was built against.
        #[arg(long, default_value = DEFAULT_REFERENCE)]
        reference: String,

        /// Rebase each line to 1.0 at its first visible date.
        #[arg(long, default_value_t = false)]
        rebase: bool,

        /// Output file. Defaults to gbi_chart.json next to the dataset.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn default_data_file() -> PathBuf {
    Path::new("assets").join("data").join(DATASET_FILE)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Update {
            config,
            symbols,
            start,
            end,
            synthetic,
            parallel,
        } => run_update(&config, symbols, start, end, synthetic, parallel),
        Commands::Status { data_file } => run_status(&data_file),
        Commands::Chart {
            data_file,
            range,
            symbols,
            baselines,
            reference,
            rebase,
            output,
        } => run_chart(ChartArgs {
            data_file,
            range,
            symbols,
            baselines,
            reference,
            rebase,
            output,
        }),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log filter '{level}'"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

fn run_update(
    config_path: &Path,
    symbols: Option<Vec<String>>,
    start: Option<String>,
    end: Option<String>,
    synthetic: bool,
    parallel: bool,
) -> Result<()> {
    let mut raw = RawReportConfig::from_file(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    if let Some(symbols) = symbols {
        raw.symbols = symbols;
    }
    if start.is_some() {
        raw.start_date = start;
    }
    if end.is_some() {
        raw.end_date = end;
    }
    raw.parallel |= parallel;

    let today = chrono::Local::now().date_naive();
    let config = raw.validate(today)?;
    tracing::info!(
        symbols = config.symbols.len(),
        start = %config.start_date,
        end = %config.end_date,
        interval = %config.interval,
        reference = %config.reference_symbol,
        "starting update"
    );

    let yahoo;
    let synthetic_provider;
    let fetcher: &dyn PriceFetcher = if synthetic {
        tracing::warn!("using SYNTHETIC prices; results are not market data");
        synthetic_provider = SyntheticProvider::new();
        &synthetic_provider
    } else {
        yahoo = YahooProvider::new()?;
        &yahoo
    };

    let outcome = run_report(&config, fetcher, &StdoutProgress)?;
    print_summary(&outcome);
    Ok(())
}

fn print_summary(outcome: &ReportOutcome) {
    println!();
    for result in &outcome.summary.outcomes {
        for (range, err) in result.errors() {
            eprintln!("Error for {} {range}: {err}", result.symbol);
        }
    }
    println!("Saved all GBI data to {}", outcome.dataset_path.display());
    println!("Chart data saved to {}", outcome.chart_path.display());
    println!(
        "Rows: {} total, {} appended this run",
        outcome.meta.row_count,
        outcome.summary.rows_appended()
    );
}

fn run_status(data_file: &Path) -> Result<()> {
    if !data_file.exists() {
        println!("Dataset does not exist: {}", data_file.display());
        return Ok(());
    }

    let store = DatasetStore::new(data_file);
    let dataset = store
        .load()
        .with_context(|| format!("loading dataset {}", data_file.display()))?;

    if dataset.is_empty() {
        println!("Dataset is empty: {}", data_file.display());
        return Ok(());
    }

    let mut symbols = dataset.symbols();
    symbols.sort_unstable();

    println!("Dataset: {}", data_file.display());
    println!("Rows:    {}", dataset.len());
    println!("Symbols: {}", symbols.len());
    if let Some(meta) = store.load_meta() {
        println!("Written: {}", meta.written_at.format("%Y-%m-%d %H:%M:%S"));
        println!("Hash:    {}", &meta.data_hash[..meta.data_hash.len().min(16)]);
    }
    println!();
    println!(
        "{:<8} {:<25} {:>8} {:>6}",
        "Symbol", "Date Range", "Rows", "Dups"
    );
    println!("{}", "-".repeat(50));
    for sym in symbols {
        let range = dataset
            .coverage(sym)
            .map(|w| format!("{} to {}", w.earliest, w.latest))
            .unwrap_or_default();
        println!(
            "{:<8} {:<25} {:>8} {:>6}",
            sym,
            range,
            dataset.partition_len(sym),
            dataset.duplicate_dates(sym)
        );
    }

    Ok(())
}

struct ChartArgs {
    data_file: PathBuf,
    range: String,
    symbols: Option<Vec<String>>,
    baselines: Option<Vec<String>>,
    reference: String,
    rebase: bool,
    output: Option<PathBuf>,
}

fn run_chart(args: ChartArgs) -> Result<()> {
    let ChartArgs {
        data_file,
        range,
        symbols,
        baselines,
        reference,
        rebase,
        output,
    } = args;
    let data_file = data_file.as_path();
    let Some(preset) = RangePreset::parse(&range) else {
        bail!("unknown range '{range}'. Valid: 7d, 30d, 3m, 6m, 1y, mtd, ytd, all");
    };

    let dataset = DatasetStore::new(data_file)
        .load()
        .with_context(|| format!("loading dataset {}", data_file.display()))?;
    if dataset.is_empty() {
        bail!("dataset {} is empty; run `update` first", data_file.display());
    }

    let today: NaiveDate = chrono::Local::now().date_naive();
    let request = ChartRequest {
        symbols: upper(symbols.unwrap_or_default()),
        baselines: baselines.map(upper).unwrap_or_else(default_baselines),
        window: preset.window(today, &dataset),
        rebase,
    };

    let output = output.unwrap_or_else(|| {
        data_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(CHART_FILE)
    });
    let reference = reference.trim().to_ascii_uppercase();
    let export = ChartExport::build(&dataset, &request, &reference);
    export
        .write(&output)
        .with_context(|| format!("writing chart data {}", output.display()))?;

    println!(
        "Chart data for {} series saved to {}",
        export.series.len(),
        output.display()
    );
    Ok(())
}

fn upper(symbols: Vec<String>) -> Vec<String> {
    symbols
        .into_iter()
        .map(|s| s.trim().to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn update_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "goldbase",
            "update",
            "--config",
            "report.toml",
            "--symbols",
            "AAPL",
            "MSFT",
            "--start",
            "2023-01-01",
            "--synthetic",
        ])
        .unwrap();
        match cli.command {
            Commands::Update {
                symbols,
                start,
                synthetic,
                ..
            } => {
                assert_eq!(symbols.unwrap(), vec!["AAPL", "MSFT"]);
                assert_eq!(start.as_deref(), Some("2023-01-01"));
                assert!(synthetic);
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn chart_defaults() {
        let cli = Cli::try_parse_from(["goldbase", "chart"]).unwrap();
        match cli.command {
            Commands::Chart {
                data_file,
                range,
                reference,
                ..
            } => {
                assert_eq!(data_file, default_data_file());
                assert_eq!(range, "all");
                assert_eq!(reference, DEFAULT_REFERENCE);
            }
            _ => panic!("expected chart"),
        }
    }

    #[test]
    fn chart_accepts_reference_override() {
        let cli = Cli::try_parse_from(["goldbase", "chart", "--reference", "IAU", "--range", "ytd"])
            .unwrap();
        match cli.command {
            Commands::Chart {
                reference, range, ..
            } => {
                assert_eq!(reference, "IAU");
                assert_eq!(range, "ytd");
            }
            _ => panic!("expected chart"),
        }
    }
}
