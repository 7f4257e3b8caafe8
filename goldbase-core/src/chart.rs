//! Chart data extraction for the comparison plot.
//!
//! The renderer is external; this module turns the dataset into what it
//! draws: one GBI line per symbol, baseline symbols flagged for emphasis,
//! optionally clipped to a preset date range and rebased to the first
//! visible point. Nothing here mutates the dataset.

use crate::dataset::{Dataset, DatasetError};
use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// Quick-select date ranges offered by the chart front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangePreset {
    Last7Days,
    Last30Days,
    Last3Months,
    Last6Months,
    LastYear,
    MonthToDate,
    YearToDate,
    FullHistory,
}

impl RangePreset {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "7d" => RangePreset::Last7Days,
            "30d" => RangePreset::Last30Days,
            "3m" => RangePreset::Last3Months,
            "6m" => RangePreset::Last6Months,
            "1y" => RangePreset::LastYear,
            "mtd" => RangePreset::MonthToDate,
            "ytd" => RangePreset::YearToDate,
            "all" => RangePreset::FullHistory,
            _ => return None,
        })
    }

    /// Resolve to an inclusive window. `FullHistory` spans the dataset and is
    /// `None` when the dataset is empty.
    pub fn window(&self, today: NaiveDate, dataset: &Dataset) -> Option<(NaiveDate, NaiveDate)> {
        let start = match self {
            RangePreset::Last7Days => today - chrono::Duration::days(7),
            RangePreset::Last30Days => today - chrono::Duration::days(30),
            RangePreset::Last3Months => today.checked_sub_months(Months::new(3))?,
            RangePreset::Last6Months => today.checked_sub_months(Months::new(6))?,
            RangePreset::LastYear => today.checked_sub_months(Months::new(12))?,
            RangePreset::MonthToDate => today.with_day(1)?,
            RangePreset::YearToDate => NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
            RangePreset::FullHistory => {
                let first = dataset.records().iter().map(|r| r.date).min()?;
                let last = dataset.records().iter().map(|r| r.date).max()?;
                return Some((first, last));
            }
        };
        Some((start, today))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub gbi: f64,
}

/// One plotted line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub symbol: String,
    /// Baseline symbols are drawn thicker and labelled "(Baseline)".
    pub emphasized: bool,
    pub points: Vec<ChartPoint>,
}

impl ChartSeries {
    pub fn label(&self) -> String {
        if self.emphasized {
            format!("{} (Baseline)", self.symbol)
        } else {
            self.symbol.clone()
        }
    }
}

/// What to put on the chart.
#[derive(Debug, Clone, Default)]
pub struct ChartRequest {
    /// Symbols to plot, in legend order. Empty means every symbol in the
    /// dataset.
    pub symbols: Vec<String>,
    pub baselines: Vec<String>,
    pub window: Option<(NaiveDate, NaiveDate)>,
    /// Divide each line by its first visible value.
    pub rebase: bool,
}

/// Build one series per requested symbol. A date that appears more than once
/// in a partition is plotted from the row inserted first. Symbols with no
/// visible points are omitted.
pub fn build_series(dataset: &Dataset, request: &ChartRequest) -> Vec<ChartSeries> {
    let symbols: Vec<String> = if request.symbols.is_empty() {
        dataset.symbols().into_iter().map(String::from).collect()
    } else {
        request.symbols.clone()
    };

    symbols
        .into_iter()
        .filter_map(|symbol| {
            let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
            for r in dataset.partition(&symbol) {
                if let Some((start, end)) = request.window {
                    if r.date < start || r.date > end {
                        continue;
                    }
                }
                by_date.entry(r.date).or_insert(r.gbi);
            }

            let base = match (request.rebase, by_date.values().next()) {
                (_, None) => return None,
                (true, Some(&first)) if first != 0.0 => first,
                _ => 1.0,
            };

            let points = by_date
                .into_iter()
                .map(|(date, gbi)| ChartPoint {
                    date,
                    gbi: gbi / base,
                })
                .collect();

            Some(ChartSeries {
                emphasized: request.baselines.contains(&symbol),
                symbol,
                points,
            })
        })
        .collect()
}

/// Wide layout for web consumers: one object per date with `"{SYM} Price"`
/// and `"{SYM} GBI"` keys, dates ascending.
/// The first inserted row wins on a duplicate date.
pub fn pivot_wide(dataset: &Dataset, request: &ChartRequest) -> Vec<Value> {
    let wanted: Option<HashSet<&str>> = (!request.symbols.is_empty())
        .then(|| request.symbols.iter().map(String::as_str).collect());

    let mut rows: BTreeMap<NaiveDate, Map<String, Value>> = BTreeMap::new();
    for r in dataset.records() {
        if wanted.as_ref().is_some_and(|w| !w.contains(r.symbol.as_str())) {
            continue;
        }
        if let Some((start, end)) = request.window {
            if r.date < start || r.date > end {
                continue;
            }
        }
        let row = rows.entry(r.date).or_default();
        row.entry(format!("{} Price", r.symbol))
            .or_insert_with(|| Value::from(r.stock_price));
        row.entry(format!("{} GBI", r.symbol))
            .or_insert_with(|| Value::from(r.gbi));
    }

    rows.into_iter()
        .map(|(date, mut row)| {
            row.insert("Date".into(), Value::from(date.to_string()));
            Value::Object(row)
        })
        .collect()
}

/// Everything a renderer needs, as one JSON document.
#[derive(Debug, Clone, Serialize)]
pub struct ChartExport {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub reference: String,
    pub window: Option<(NaiveDate, NaiveDate)>,
    pub series: Vec<ChartSeries>,
    pub rows: Vec<Value>,
}

impl ChartExport {
    pub fn build(dataset: &Dataset, request: &ChartRequest, reference: &str) -> Self {
        Self {
            title: "Gold-Based Index (GBI)".into(),
            x_label: "Date".into(),
            y_label: "Normalized GBI".into(),
            reference: reference.to_string(),
            window: request.window,
            series: build_series(dataset, request),
            rows: pivot_wide(dataset, request),
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), DatasetError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| DatasetError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
