//! Report assembly: load, reconcile every configured symbol, persist, export.

use crate::chart::{ChartExport, ChartRequest};
use crate::config::ReportConfig;
use crate::data::PriceFetcher;
use crate::dataset::{Dataset, DatasetError, DatasetMeta, DatasetStore};
use crate::gbi::GbiCalculator;
use crate::reconcile::{reconcile_all, ReconcileOptions, ReconcileProgress, RunSummary};
use std::path::PathBuf;
use tracing::info;

/// Everything a finished run produced.
#[derive(Debug)]
pub struct ReportOutcome {
    pub summary: RunSummary,
    pub dataset: Dataset,
    pub meta: DatasetMeta,
    pub dataset_path: PathBuf,
    pub chart_path: PathBuf,
}

/// Run one full report.
///
/// Per-symbol failures are recorded in the summary and never abort the run;
/// the dataset is always written back. Only dataset and chart I/O errors are
/// returned as `Err`.
pub fn run_report(
    config: &ReportConfig,
    fetcher: &dyn PriceFetcher,
    progress: &dyn ReconcileProgress,
) -> Result<ReportOutcome, DatasetError> {
    let store = DatasetStore::new(config.dataset_path());
    let mut dataset = store.load()?;
    info!(
        path = %store.path().display(),
        rows = dataset.len(),
        fetcher = fetcher.name(),
        "loaded dataset"
    );

    let calc = GbiCalculator::new(fetcher, &config.reference_symbol)
        .with_interval(config.interval)
        .with_adjustment(config.adjustment);

    let summary = reconcile_all(
        &mut dataset,
        &calc,
        &config.symbols,
        config.start_date,
        config.end_date,
        ReconcileOptions {
            merge_policy: config.merge_policy,
            parallel: config.parallel,
        },
        progress,
    );

    let meta = store.save(&dataset)?;
    info!(path = %store.path().display(), rows = meta.row_count, "saved dataset");

    let chart_request = ChartRequest {
        symbols: config.symbols.clone(),
        baselines: config.baselines.clone(),
        window: Some((config.start_date, config.end_date)),
        rebase: false,
    };
    let chart_path = config.chart_path();
    ChartExport::build(&dataset, &chart_request, &config.reference_symbol).write(&chart_path)?;
    info!(path = %chart_path.display(), "wrote chart data");

    Ok(ReportOutcome {
        summary,
        dataset,
        meta,
        dataset_path: store.path().to_path_buf(),
        chart_path,
    })
}
