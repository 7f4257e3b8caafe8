//! Report configuration.
//!
//! Loaded from TOML (or JSON, by file extension) into a raw document, then
//! validated into a [`ReportConfig`] with every default filled in. The only
//! date default is `end_date`, which falls back to today.

use crate::data::{Adjustment, Interval};
use crate::dataset::MergePolicy;
use crate::gbi::DEFAULT_REFERENCE;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the persisted dataset inside `output_dir`.
pub const DATASET_FILE: &str = "all_gbi_data.csv";
/// File name of the chart export inside `output_dir`.
pub const CHART_FILE: &str = "gbi_chart.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config document as written by the user. Dates are strings so that a bad
/// date produces a validation error naming the field.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawReportConfig {
    #[serde(default)]
    pub symbols: Vec<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub interval: Interval,
    pub reference_symbol: Option<String>,
    pub baselines: Option<Vec<String>>,
    #[serde(default)]
    pub adjustment: Adjustment,
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub merge_policy: MergePolicy,
}

impl RawReportConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load by extension: `.json` is JSON, anything else is TOML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content),
        }
    }

    /// Validate and fill defaults. `today` backs the `end_date` default.
    pub fn validate(self, today: NaiveDate) -> Result<ReportConfig, ConfigError> {
        let symbols = normalize_symbols(&self.symbols);
        if symbols.is_empty() {
            return Err(ConfigError::Invalid("`symbols` must list at least one ticker".into()));
        }

        let start_date = match self.start_date.as_deref() {
            Some(s) => parse_date("start_date", s)?,
            None => return Err(ConfigError::Invalid("`start_date` is required".into())),
        };
        let end_date = match self.end_date.as_deref() {
            Some(s) => parse_date("end_date", s)?,
            None => today,
        };
        if start_date > end_date {
            return Err(ConfigError::Invalid(format!(
                "start_date {start_date} is after end_date {end_date}"
            )));
        }

        let reference_symbol = self
            .reference_symbol
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_REFERENCE.to_string());

        let baselines = match self.baselines {
            Some(b) => normalize_symbols(&b),
            None => default_baselines(),
        };

        Ok(ReportConfig {
            symbols,
            start_date,
            end_date,
            interval: self.interval,
            reference_symbol,
            baselines,
            adjustment: self.adjustment,
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from("assets/data")),
            parallel: self.parallel,
            merge_policy: self.merge_policy,
        })
    }
}

/// Validated configuration for one report run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportConfig {
    pub symbols: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub interval: Interval,
    pub reference_symbol: String,
    pub baselines: Vec<String>,
    pub adjustment: Adjustment,
    pub output_dir: PathBuf,
    pub parallel: bool,
    pub merge_policy: MergePolicy,
}

impl ReportConfig {
    pub fn dataset_path(&self) -> PathBuf {
        self.output_dir.join(DATASET_FILE)
    }

    pub fn chart_path(&self) -> PathBuf {
        self.output_dir.join(CHART_FILE)
    }

    pub fn is_baseline(&self, symbol: &str) -> bool {
        self.baselines.iter().any(|b| b == symbol)
    }
}

/// Gold plus the two broad-market ETFs.
pub fn default_baselines() -> Vec<String> {
    ["GLD", "QQQ", "SPY"].into_iter().map(String::from).collect()
}

/// Trim, upper-case, drop blanks, and dedup keeping first occurrence.
fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        ConfigError::Invalid(format!("`{field}` must be YYYY-MM-DD, got {value:?}: {e}"))
    })
}
