//! Price fetcher trait, request/response types, and structured error types.
//!
//! The `PriceFetcher` trait abstracts over price sources (Yahoo Finance,
//! synthetic random walks, test mocks) so the GBI calculation and the
//! reconciliation logic never know where closes come from.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single closing price on a single date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// Closing prices for one symbol, strictly increasing by date.
///
/// The only way to build one is through [`PriceSeries::from_points`], which
/// sorts and drops duplicate dates, so the ordering invariant always holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series from points in any order. On duplicate dates the first
    /// occurrence wins.
    pub fn from_points(mut points: Vec<PricePoint>) -> Self {
        // Stable sort keeps the first occurrence ahead of later duplicates.
        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        Self { points }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Keep only points inside `[start, end]`.
    pub fn restrict(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            points: self
                .points
                .iter()
                .filter(|p| p.date >= start && p.date <= end)
                .copied()
                .collect(),
        }
    }
}

/// Sampling interval requested from the provider.
///
/// Names match the provider's query-string tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "2m")]
    TwoMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "60m")]
    SixtyMinutes,
    #[serde(rename = "90m")]
    NinetyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[default]
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1wk")]
    Weekly,
    #[serde(rename = "1mo")]
    Monthly,
    #[serde(rename = "3mo")]
    Quarterly,
}

impl Interval {
    pub const ALL: [Interval; 13] = [
        Interval::OneMinute,
        Interval::TwoMinutes,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::SixtyMinutes,
        Interval::NinetyMinutes,
        Interval::OneHour,
        Interval::Daily,
        Interval::FiveDays,
        Interval::Weekly,
        Interval::Monthly,
        Interval::Quarterly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::TwoMinutes => "2m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::SixtyMinutes => "60m",
            Interval::NinetyMinutes => "90m",
            Interval::OneHour => "1h",
            Interval::Daily => "1d",
            Interval::FiveDays => "5d",
            Interval::Weekly => "1wk",
            Interval::Monthly => "1mo",
            Interval::Quarterly => "3mo",
        }
    }

    /// True for granularities finer than one trading day.
    pub fn is_intraday(&self) -> bool {
        matches!(
            self,
            Interval::OneMinute
                | Interval::TwoMinutes
                | Interval::FiveMinutes
                | Interval::FifteenMinutes
                | Interval::ThirtyMinutes
                | Interval::SixtyMinutes
                | Interval::NinetyMinutes
                | Interval::OneHour
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.as_str() == s)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which close the provider should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    /// Unadjusted close.
    #[default]
    Raw,
    /// Split- and dividend-adjusted close.
    Adjusted,
}

/// One request to a price fetcher. Both ends of the range are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: Interval,
    pub adjustment: Adjustment,
}

impl FetchRequest {
    pub fn daily(symbol: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            end,
            interval: Interval::Daily,
            adjustment: Adjustment::Raw,
        }
    }

    /// Same options, different symbol.
    pub fn for_symbol(&self, symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..self.clone()
        }
    }
}

/// Structured error types for fetch operations.
///
/// Displayable as-is in CLI output and log lines.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("data error: {0}")]
    Other(String),
}

/// Where prices came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    YahooFinance,
    Synthetic,
    Fixture,
}

/// Trait for closing-price sources.
///
/// An empty `Ok` series and `Err(DataError::SymbolNotFound)` both mean "no
/// data for this symbol and range"; callers treat them the same way.
pub trait PriceFetcher: Send + Sync {
    /// Human-readable name of this fetcher.
    fn name(&self) -> &str;

    /// Provenance tag for anything this fetcher returns.
    fn source(&self) -> DataSource;

    /// Fetch closing prices for `request.symbol` over `[request.start, request.end]`.
    fn fetch(&self, request: &FetchRequest) -> Result<PriceSeries, DataError>;
}
