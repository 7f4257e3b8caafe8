//! Incremental dataset reconciliation.
//!
//! For each symbol, compare the partition's coverage window with the requested
//! `[global_start, global_end]` window, fetch only the gaps, and append the new
//! batches to the dataset. The decision rules:
//!
//! 1. No rows for the symbol: fetch the full window, nothing else.
//! 2. `earliest < global_start`: left side covered, no left fetch.
//!    Otherwise fetch `[global_start, earliest]`.
//! 3. `latest < global_end`: fetch `[latest, global_end]`.
//!    Otherwise right side covered, no right fetch.
//!
//! Gap ranges share their boundary date with the existing partition, so under
//! `MergePolicy::Append` that date ends up in the partition twice. Each batch
//! is normalized on its own first date; partitions are never rebased.
//!
//! A failed range contributes zero rows and never stops the other range or
//! the remaining symbols.

use crate::dataset::{CoverageWindow, Dataset, MergePolicy};
use crate::gbi::{GbiCalculator, GbiError, GbiRecord};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Which part of the requested window a fetch covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapSide {
    /// The symbol had no rows; the whole window is fetched.
    Full,
    Left,
    Right,
}

impl fmt::Display for GapSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GapSide::Full => "full",
            GapSide::Left => "left",
            GapSide::Right => "right",
        })
    }
}

/// One range to compute, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchRange {
    pub side: GapSide,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for FetchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}, {}]", self.side, self.start, self.end)
    }
}

/// Decide which ranges must be computed for a symbol with `coverage`.
pub fn plan_fetches(
    coverage: Option<CoverageWindow>,
    global_start: NaiveDate,
    global_end: NaiveDate,
) -> Vec<FetchRange> {
    let Some(window) = coverage else {
        return vec![FetchRange {
            side: GapSide::Full,
            start: global_start,
            end: global_end,
        }];
    };

    let mut plan = Vec::with_capacity(2);
    if window.earliest >= global_start {
        plan.push(FetchRange {
            side: GapSide::Left,
            start: global_start,
            end: window.earliest,
        });
    }
    if window.latest < global_end {
        plan.push(FetchRange {
            side: GapSide::Right,
            start: window.latest,
            end: global_end,
        });
    }
    plan
}

/// What happened to one planned range.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeOutcome {
    pub range: FetchRange,
    /// Rows appended, or the reason the range contributed nothing.
    pub result: Result<usize, GbiError>,
}

/// Result of reconciling one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub symbol: String,
    pub ranges: Vec<RangeOutcome>,
}

impl ReconcileOutcome {
    /// True when the plan was empty: the partition already covered the window.
    pub fn up_to_date(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn rows_appended(&self) -> usize {
        self.ranges
            .iter()
            .filter_map(|r| r.result.as_ref().ok())
            .sum()
    }

    pub fn errors(&self) -> impl Iterator<Item = (&FetchRange, &GbiError)> {
        self.ranges
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|e| (&r.range, e)))
    }

    pub fn is_success(&self) -> bool {
        self.errors().next().is_none()
    }
}

/// Options for a reconciliation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    pub merge_policy: MergePolicy,
    /// Fetch symbols concurrently. Appends still happen one symbol at a time,
    /// in input order.
    pub parallel: bool,
}

type BatchResult = (FetchRange, Result<Vec<GbiRecord>, GbiError>);

/// Run every planned range through the calculator. Does not touch the dataset.
fn compute_plan(calc: &GbiCalculator<'_>, symbol: &str, plan: &[FetchRange]) -> Vec<BatchResult> {
    plan.iter()
        .map(|range| {
            debug!(symbol, %range, "computing GBI batch");
            (*range, calc.compute(symbol, range.start, range.end))
        })
        .collect()
}

/// Append computed batches. A failed batch appends nothing.
fn merge_batches(
    dataset: &mut Dataset,
    symbol: &str,
    batches: Vec<BatchResult>,
    policy: MergePolicy,
) -> ReconcileOutcome {
    let ranges = batches
        .into_iter()
        .map(|(range, batch)| {
            let result = batch.map(|records| dataset.append_batch(records, policy));
            match &result {
                Ok(rows) => info!(symbol, %range, rows, "merged GBI batch"),
                Err(e @ (GbiError::NonFinite { .. } | GbiError::NonPositive { .. })) => {
                    error!(symbol, %range, "{e}")
                }
                Err(e) => warn!(symbol, %range, "skipping range: {e}"),
            }
            RangeOutcome { range, result }
        })
        .collect();

    ReconcileOutcome {
        symbol: symbol.to_string(),
        ranges,
    }
}

/// Bring one symbol's partition up to `[global_start, global_end]`.
///
/// Coverage is read once before any fetch, so a left-gap append cannot change
/// the right-gap decision.
pub fn reconcile(
    dataset: &mut Dataset,
    calc: &GbiCalculator<'_>,
    symbol: &str,
    global_start: NaiveDate,
    global_end: NaiveDate,
    policy: MergePolicy,
) -> ReconcileOutcome {
    let plan = plan_fetches(dataset.coverage(symbol), global_start, global_end);
    if plan.is_empty() {
        debug!(symbol, "partition already covers requested window");
    }
    let batches = compute_plan(calc, symbol, &plan);
    merge_batches(dataset, symbol, batches, policy)
}

/// Progress callback for multi-symbol passes.
pub trait ReconcileProgress: Send {
    /// Called when a symbol is about to be merged.
    fn on_start(&self, symbol: &str, index: usize, total: usize);

    /// Called after a symbol's batches have been merged.
    fn on_complete(&self, index: usize, total: usize, outcome: &ReconcileOutcome);

    /// Called once the whole pass is done.
    fn on_batch_complete(&self, summary: &RunSummary);
}

/// Prints progress to stdout.
pub struct StdoutProgress;

impl ReconcileProgress for StdoutProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        println!("[{}/{}] Calculating GBI for {symbol}...", index + 1, total);
    }

    fn on_complete(&self, _index: usize, _total: usize, outcome: &ReconcileOutcome) {
        if outcome.up_to_date() {
            println!("  UP TO DATE: {}", outcome.symbol);
            return;
        }
        for r in &outcome.ranges {
            match &r.result {
                Ok(rows) => println!("  OK: {} {} (+{rows} rows)", outcome.symbol, r.range),
                Err(e) => println!("  FAIL: {} {}: {e}", outcome.symbol, r.range),
            }
        }
    }

    fn on_batch_complete(&self, summary: &RunSummary) {
        println!(
            "\nReconcile complete: {}/{} succeeded, {} failed, {} rows appended",
            summary.succeeded(),
            summary.total(),
            summary.failed(),
            summary.rows_appended()
        );
    }
}

/// Discards all progress events.
pub struct SilentProgress;

impl ReconcileProgress for SilentProgress {
    fn on_start(&self, _: &str, _: usize, _: usize) {}
    fn on_complete(&self, _: usize, _: usize, _: &ReconcileOutcome) {}
    fn on_batch_complete(&self, _: &RunSummary) {}
}

/// Outcomes of a multi-symbol pass, in input order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<ReconcileOutcome>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn rows_appended(&self) -> usize {
        self.outcomes.iter().map(|o| o.rows_appended()).sum()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    pub fn outcome(&self, symbol: &str) -> Option<&ReconcileOutcome> {
        self.outcomes.iter().find(|o| o.symbol == symbol)
    }
}

/// Reconcile every symbol against the same window.
///
/// With `options.parallel`, each symbol's plan is taken from the dataset as it
/// stands before the pass, batches are computed concurrently, and the merge
/// runs afterwards in input order.
pub fn reconcile_all(
    dataset: &mut Dataset,
    calc: &GbiCalculator<'_>,
    symbols: &[String],
    global_start: NaiveDate,
    global_end: NaiveDate,
    options: ReconcileOptions,
    progress: &dyn ReconcileProgress,
) -> RunSummary {
    let total = symbols.len();
    let mut summary = RunSummary::default();

    if options.parallel {
        let plans: Vec<Vec<FetchRange>> = symbols
            .iter()
            .map(|s| plan_fetches(dataset.coverage(s), global_start, global_end))
            .collect();

        let computed: Vec<Vec<BatchResult>> = symbols
            .par_iter()
            .zip(plans.par_iter())
            .map(|(symbol, plan)| compute_plan(calc, symbol, plan))
            .collect();

        for (i, (symbol, batches)) in symbols.iter().zip(computed).enumerate() {
            progress.on_start(symbol, i, total);
            let outcome = merge_batches(dataset, symbol, batches, options.merge_policy);
            progress.on_complete(i, total, &outcome);
            summary.outcomes.push(outcome);
        }
    } else {
        for (i, symbol) in symbols.iter().enumerate() {
            progress.on_start(symbol, i, total);
            let outcome = reconcile(
                dataset,
                calc,
                symbol,
                global_start,
                global_end,
                options.merge_policy,
            );
            progress.on_complete(i, total, &outcome);
            summary.outcomes.push(outcome);
        }
    }

    progress.on_batch_complete(&summary);
    summary
}
