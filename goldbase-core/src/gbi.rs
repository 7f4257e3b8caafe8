//! Gold-based index calculation.
//!
//! GBI for a date is `stock close / gold close`, divided by the same ratio on
//! the first aligned date of the batch, so every batch starts at exactly 1.0.

use crate::data::{align_pair, Adjustment, DataError, FetchRequest, Interval, PriceFetcher};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default gold proxy used as the ratio denominator.
pub const DEFAULT_REFERENCE: &str = "GLD";

/// One row of the dataset. Field names follow the persisted column headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbiRecord {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Stock Price")]
    pub stock_price: f64,
    #[serde(rename = "Gold Price")]
    pub gold_price: f64,
    #[serde(rename = "GBI")]
    pub gbi: f64,
    #[serde(rename = "Stock Symbol")]
    pub symbol: String,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GbiError {
    #[error("no data found for symbol: {symbol}")]
    NoData { symbol: String },

    #[error("non-finite GBI for {symbol} on {date}")]
    NonFinite { symbol: String, date: NaiveDate },

    #[error("non-positive close for {symbol} on {date}")]
    NonPositive { symbol: String, date: NaiveDate },

    #[error(transparent)]
    Fetch(#[from] DataError),
}

impl GbiError {
    /// Missing data is the expected, recoverable failure; everything else
    /// points at a provider or numeric problem.
    pub fn is_no_data(&self) -> bool {
        matches!(self, GbiError::NoData { .. })
    }
}

/// Computes GBI batches against a fixed reference symbol.
pub struct GbiCalculator<'a> {
    fetcher: &'a dyn PriceFetcher,
    reference: String,
    interval: Interval,
    adjustment: Adjustment,
}

impl<'a> GbiCalculator<'a> {
    pub fn new(fetcher: &'a dyn PriceFetcher, reference: impl Into<String>) -> Self {
        Self {
            fetcher,
            reference: reference.into(),
            interval: Interval::Daily,
            adjustment: Adjustment::Raw,
        }
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_adjustment(mut self, adjustment: Adjustment) -> Self {
        self.adjustment = adjustment;
        self
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn fetcher_name(&self) -> &str {
        self.fetcher.name()
    }

    /// Compute one normalized batch for `symbol` over `[start, end]`.
    ///
    /// The target is fetched first; the reference is only fetched when the
    /// target has data.
    pub fn compute(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<GbiRecord>, GbiError> {
        let request = FetchRequest {
            symbol: symbol.to_string(),
            start,
            end,
            interval: self.interval,
            adjustment: self.adjustment,
        };

        let stock = fetch_or_no_data(self.fetcher, &request)?;
        let gold = fetch_or_no_data(self.fetcher, &request.for_symbol(&self.reference))?;

        let aligned = align_pair(&stock, &gold);
        debug!(
            symbol,
            stock_points = stock.len(),
            gold_points = gold.len(),
            aligned = aligned.len(),
            "aligned price series"
        );

        let Some(first) = aligned.first() else {
            return Err(GbiError::NoData {
                symbol: symbol.to_string(),
            });
        };

        let base = first.left / first.right;
        if !base.is_finite() || base == 0.0 {
            return Err(GbiError::NonFinite {
                symbol: symbol.to_string(),
                date: first.date,
            });
        }

        aligned
            .iter()
            .map(|pair| {
                let gbi = (pair.left / pair.right) / base;
                if !gbi.is_finite() {
                    return Err(GbiError::NonFinite {
                        symbol: symbol.to_string(),
                        date: pair.date,
                    });
                }
                // Bad ticks (0.0 or negative closes) still give a finite ratio.
                if pair.left <= 0.0 || pair.right <= 0.0 {
                    return Err(GbiError::NonPositive {
                        symbol: symbol.to_string(),
                        date: pair.date,
                    });
                }
                Ok(GbiRecord {
                    date: pair.date,
                    stock_price: pair.left,
                    gold_price: pair.right,
                    gbi,
                    symbol: symbol.to_string(),
                })
            })
            .collect()
    }
}

/// Fetch a series, folding "not found" and "empty" into `GbiError::NoData`.
fn fetch_or_no_data(
    fetcher: &dyn PriceFetcher,
    request: &FetchRequest,
) -> Result<crate::data::PriceSeries, GbiError> {
    let no_data = || GbiError::NoData {
        symbol: request.symbol.clone(),
    };
    match fetcher.fetch(request) {
        Ok(series) if series.is_empty() => Err(no_data()),
        Ok(series) => Ok(series),
        Err(DataError::SymbolNotFound { .. }) => Err(no_data()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataSource, PricePoint, PriceSeries};
    use std::collections::HashMap;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    /// Fixed series per symbol, clipped to the requested range.
    struct FixedFetcher {
        series: HashMap<String, PriceSeries>,
    }

    impl FixedFetcher {
        fn new(entries: Vec<(&str, Vec<(&str, f64)>)>) -> Self {
            let series = entries
                .into_iter()
                .map(|(sym, points)| {
                    let pts = points.iter().map(|(date, c)| PricePoint::new(d(date), *c)).collect();
                    (sym.to_string(), PriceSeries::from_points(pts))
                })
                .collect();
            Self { series }
        }
    }

    impl PriceFetcher for FixedFetcher {
        fn name(&self) -> &str {
            "fixed"
        }
        fn source(&self) -> DataSource {
            DataSource::Fixture
        }
        fn fetch(&self, request: &FetchRequest) -> Result<PriceSeries, DataError> {
            match self.series.get(&request.symbol) {
                Some(s) => Ok(s.restrict(request.start, request.end)),
                None => Err(DataError::SymbolNotFound {
                    symbol: request.symbol.clone(),
                }),
            }
        }
    }

    #[test]
    fn first_record_is_exactly_one() {
        let f = FixedFetcher::new(vec![
            ("AAPL", vec![("2024-01-02", 185.64), ("2024-01-03", 184.25)]),
            ("GLD", vec![("2024-01-02", 190.12), ("2024-01-03", 189.5)]),
        ]);
        let calc = GbiCalculator::new(&f, "GLD");
        let records = calc.compute("AAPL", d("2024-01-01"), d("2024-01-31")).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].gbi, 1.0);
        let expected = (184.25 / 189.5) / (185.64 / 190.12);
        assert!((records[1].gbi - expected).abs() < 1e-12);
        assert_eq!(records[1].symbol, "AAPL");
        assert_eq!(records[1].gold_price, 189.5);
    }

    #[test]
    fn aligns_by_date_not_position() {
        let f = FixedFetcher::new(vec![
            ("AAPL", vec![("2024-01-01", 1.0), ("2024-01-02", 2.0), ("2024-01-03", 3.0)]),
            ("GLD", vec![("2024-01-02", 4.0), ("2024-01-03", 5.0), ("2024-01-04", 6.0)]),
        ]);
        let calc = GbiCalculator::new(&f, "GLD");
        let records = calc.compute("AAPL", d("2024-01-01"), d("2024-01-04")).unwrap();

        let dates: Vec<_> = records.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d("2024-01-02"), d("2024-01-03")]);
        assert_eq!(records[0].stock_price, 2.0);
        assert_eq!(records[0].gold_price, 4.0);
    }

    #[test]
    fn single_aligned_date_is_one() {
        let f = FixedFetcher::new(vec![
            ("AAPL", vec![("2024-01-02", 7.0)]),
            ("GLD", vec![("2024-01-02", 3.0)]),
        ]);
        let records = GbiCalculator::new(&f, "GLD")
            .compute("AAPL", d("2024-01-01"), d("2024-01-05"))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].gbi, 1.0);
    }

    #[test]
    fn missing_target_is_no_data_for_target() {
        let f = FixedFetcher::new(vec![("GLD", vec![("2024-01-02", 3.0)])]);
        let err = GbiCalculator::new(&f, "GLD")
            .compute("XYZ", d("2024-01-01"), d("2024-01-05"))
            .unwrap_err();
        assert_eq!(err, GbiError::NoData { symbol: "XYZ".into() });
        assert!(err.is_no_data());
    }

    #[test]
    fn empty_reference_is_no_data_for_reference() {
        let f = FixedFetcher::new(vec![
            ("AAPL", vec![("2024-01-02", 7.0)]),
            ("GLD", vec![("2023-06-01", 3.0)]),
        ]);
        let err = GbiCalculator::new(&f, "GLD")
            .compute("AAPL", d("2024-01-01"), d("2024-01-05"))
            .unwrap_err();
        assert_eq!(err, GbiError::NoData { symbol: "GLD".into() });
    }

    #[test]
    fn zero_gold_price_surfaces_as_non_finite() {
        let f = FixedFetcher::new(vec![
            ("AAPL", vec![("2024-01-02", 7.0), ("2024-01-03", 8.0)]),
            ("GLD", vec![("2024-01-02", 3.0), ("2024-01-03", 0.0)]),
        ]);
        let err = GbiCalculator::new(&f, "GLD")
            .compute("AAPL", d("2024-01-01"), d("2024-01-05"))
            .unwrap_err();
        assert_eq!(
            err,
            GbiError::NonFinite {
                symbol: "AAPL".into(),
                date: d("2024-01-03")
            }
        );
    }

    #[test]
    fn negative_stock_close_is_rejected() {
        let f = FixedFetcher::new(vec![
            ("AAPL", vec![("2024-01-02", 4.0), ("2024-01-03", -4.0)]),
            ("GLD", vec![("2024-01-02", 2.0), ("2024-01-03", 2.0)]),
        ]);
        let err = GbiCalculator::new(&f, "GLD")
            .compute("AAPL", d("2024-01-01"), d("2024-01-05"))
            .unwrap_err();
        assert_eq!(
            err,
            GbiError::NonPositive {
                symbol: "AAPL".into(),
                date: d("2024-01-03")
            }
        );
    }

    #[test]
    fn zero_stock_and_negative_gold_are_rejected() {
        let zero_stock = FixedFetcher::new(vec![
            ("AAPL", vec![("2024-01-02", 4.0), ("2024-01-03", 0.0)]),
            ("GLD", vec![("2024-01-02", 2.0), ("2024-01-03", 2.0)]),
        ]);
        let err = GbiCalculator::new(&zero_stock, "GLD")
            .compute("AAPL", d("2024-01-01"), d("2024-01-05"))
            .unwrap_err();
        assert!(matches!(err, GbiError::NonPositive { .. }));

        let negative_gold = FixedFetcher::new(vec![
            ("AAPL", vec![("2024-01-02", -4.0), ("2024-01-03", 5.0)]),
            ("GLD", vec![("2024-01-02", -2.0), ("2024-01-03", 2.0)]),
        ]);
        let err = GbiCalculator::new(&negative_gold, "GLD")
            .compute("AAPL", d("2024-01-01"), d("2024-01-05"))
            .unwrap_err();
        assert_eq!(
            err,
            GbiError::NonPositive {
                symbol: "AAPL".into(),
                date: d("2024-01-02")
            }
        );
    }

    #[test]
    fn transport_errors_pass_through() {
        struct Down;
        impl PriceFetcher for Down {
            fn name(&self) -> &str {
                "down"
            }
            fn source(&self) -> DataSource {
                DataSource::Fixture
            }
            fn fetch(&self, _: &FetchRequest) -> Result<PriceSeries, DataError> {
                Err(DataError::NetworkUnreachable("offline".into()))
            }
        }
        let err = GbiCalculator::new(&Down, "GLD")
            .compute("AAPL", d("2024-01-01"), d("2024-01-05"))
            .unwrap_err();
        assert!(matches!(err, GbiError::Fetch(DataError::NetworkUnreachable(_))));
        assert!(!err.is_no_data());
    }
}
