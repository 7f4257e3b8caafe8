//! Deterministic synthetic price fetcher for offline runs and tests.
//!
//! Produces a weekday-only random walk from 100.0, seeded by the BLAKE3 hash
//! of the symbol, so the same symbol and range always yield the same closes.
//! Output is tagged `DataSource::Synthetic` and is never real market data.

use super::provider::{DataError, DataSource, FetchRequest, PriceFetcher, PricePoint, PriceSeries};
use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Random-walk fetcher. Symbols listed in `missing` return an empty series.
#[derive(Debug, Default)]
pub struct SyntheticProvider {
    missing: HashSet<String>,
}

impl SyntheticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `symbol` behave like a ticker the provider has never heard of.
    pub fn with_missing(mut self, symbol: impl Into<String>) -> Self {
        self.missing.insert(symbol.into());
        self
    }
}

impl PriceFetcher for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn source(&self) -> DataSource {
        DataSource::Synthetic
    }

    fn fetch(&self, request: &FetchRequest) -> Result<PriceSeries, DataError> {
        if self.missing.contains(&request.symbol) {
            return Ok(PriceSeries::empty());
        }
        Ok(random_walk(&request.symbol, request.start, request.end))
    }
}

/// The walk always starts at `WALK_ORIGIN` so a given date has the same close
/// no matter which sub-range is requested.
const WALK_ORIGIN: (i32, u32, u32) = (2000, 1, 3);

fn random_walk(symbol: &str, start: NaiveDate, end: NaiveDate) -> PriceSeries {
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let (y, m, d) = WALK_ORIGIN;
    let mut current = NaiveDate::from_ymd_opt(y, m, d).unwrap_or(start).min(start);
    let mut price = 100.0_f64;
    let mut points = Vec::new();

    while current <= end {
        if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            current += chrono::Duration::days(1);
            continue;
        }

        let daily_return: f64 = rng.gen_range(-0.03..0.03);
        price *= 1.0 + daily_return;

        if current >= start {
            points.push(PricePoint::new(current, price));
        }
        current += chrono::Duration::days(1);
    }

    PriceSeries::from_points(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn skips_weekends() {
        let p = SyntheticProvider::new();
        // 2024-01-06/07 are Sat/Sun
        let series = p
            .fetch(&FetchRequest::daily("SPY", d("2024-01-05"), d("2024-01-08")))
            .unwrap();
        let dates: Vec<_> = series.points().iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![d("2024-01-05"), d("2024-01-08")]);
    }

    #[test]
    fn same_date_same_close_across_ranges() {
        let p = SyntheticProvider::new();
        let wide = p
            .fetch(&FetchRequest::daily("SPY", d("2024-01-01"), d("2024-01-31")))
            .unwrap();
        let narrow = p
            .fetch(&FetchRequest::daily("SPY", d("2024-01-15"), d("2024-01-20")))
            .unwrap();
        let first = narrow.points()[0];
        let matching = wide.points().iter().find(|p| p.date == first.date).unwrap();
        assert_eq!(matching.close, first.close);
    }

    #[test]
    fn different_symbols_get_different_walks() {
        let p = SyntheticProvider::new();
        let req = FetchRequest::daily("SPY", d("2024-01-01"), d("2024-01-31"));
        let spy = p.fetch(&req).unwrap();
        let qqq = p.fetch(&req.for_symbol("QQQ")).unwrap();
        assert_eq!(spy.len(), qqq.len());
        assert_ne!(spy.points()[0].close, qqq.points()[0].close);
    }

    #[test]
    fn missing_symbol_is_empty() {
        let p = SyntheticProvider::new().with_missing("XYZ");
        let series = p
            .fetch(&FetchRequest::daily("XYZ", d("2024-01-01"), d("2024-01-31")))
            .unwrap();
        assert!(series.is_empty());
    }
}
