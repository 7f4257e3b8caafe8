//! Goldbase Core: gold-based index (GBI) calculation and incremental caching.
//!
//! This crate contains:
//! - Price fetcher trait with Yahoo Finance and synthetic providers
//! - Date alignment of an equity series against the gold proxy
//! - GBI calculation with per-batch normalization
//! - The flat, symbol-partitioned dataset and its CSV store
//! - Incremental reconciliation of the dataset against a requested window
//! - Chart data extraction and report assembly

pub mod chart;
pub mod config;
pub mod data;
pub mod dataset;
pub mod gbi;
pub mod reconcile;
pub mod report;

pub use config::{ConfigError, RawReportConfig, ReportConfig};
pub use dataset::{CoverageWindow, Dataset, DatasetError, DatasetStore, MergePolicy};
pub use gbi::{GbiCalculator, GbiError, GbiRecord};
pub use reconcile::{
    plan_fetches, reconcile, reconcile_all, FetchRange, GapSide, ReconcileOptions,
    ReconcileOutcome, RunSummary,
};
pub use report::{run_report, ReportOutcome};
