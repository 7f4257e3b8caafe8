//! Yahoo Finance price fetcher.
//!
//! Fetches closes from Yahoo's v8 chart API. Handles retries with exponential
//! backoff and response parsing. Yahoo has no official API and changes its
//! response format without notice; parse failures surface as
//! `DataError::ResponseFormatChanged`.

use super::provider::{
    Adjustment, DataError, DataSource, FetchRequest, PriceFetcher, PricePoint, PriceSeries,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds.
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance price fetcher.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    pub fn new() -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Build the chart API URL for a request. Both ends are inclusive.
    fn chart_url(request: &FetchRequest) -> String {
        let start_ts = day_start_ts(request.start);
        let end_ts = day_start_ts(request.end) + 86_399;
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{symbol}\
             ?period1={start_ts}&period2={end_ts}&interval={interval}\
             &includeAdjustedClose=true",
            symbol = request.symbol,
            interval = request.interval,
        )
    }

    /// Parse the chart API response into a price series.
    fn parse_response(
        symbol: &str,
        adjustment: Adjustment,
        resp: ChartResponse,
    ) -> Result<PriceSeries, DataError> {
        let result = resp.chart.result.ok_or_else(|| {
            if let Some(err) = resp.chart.error {
                if err.code == "Not Found" {
                    DataError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    }
                } else {
                    DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
                }
            } else {
                DataError::ResponseFormatChanged("empty result with no error".into())
            }
        })?;

        let Some(data) = result.into_iter().next() else {
            return Ok(PriceSeries::empty());
        };

        // A range with no trading days comes back without timestamps.
        let Some(timestamps) = data.timestamp else {
            return Ok(PriceSeries::empty());
        };

        let closes = match adjustment {
            Adjustment::Raw => data
                .indicators
                .quote
                .into_iter()
                .next()
                .map(|q| q.close)
                .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?,
            Adjustment::Adjusted => data
                .indicators
                .adjclose
                .and_then(|v| v.into_iter().next())
                .map(|a| a.adjclose)
                .ok_or_else(|| DataError::ResponseFormatChanged("no adjclose data".into()))?,
        };

        // Session dates are exchange-local; a UTC date is a day early for
        // markets that open before midnight UTC.
        let gmtoffset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);

        let mut points = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts + gmtoffset, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            // Holidays and halted sessions come back as nulls
            if let Some(close) = closes.get(i).copied().flatten() {
                points.push(PricePoint::new(date, close));
            }
        }

        // Intraday intervals yield several points per date; the last one is
        // the session close.
        points.reverse();
        Ok(PriceSeries::from_points(points))
    }

    /// Execute a single HTTP request with retry logic.
    fn fetch_with_retry(&self, request: &FetchRequest) -> Result<PriceSeries, DataError> {
        let url = Self::chart_url(request);
        let symbol = request.symbol.as_str();
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(symbol, attempt, ?delay, "retrying chart request");
                std::thread::sleep(delay);
            }

            match self.client.get(&url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(DataError::SymbolNotFound {
                            symbol: symbol.to_string(),
                        });
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        warn!(symbol, retry_after, "rate limited by Yahoo");
                        last_error = Some(DataError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if !status.is_success() {
                        last_error = Some(DataError::Other(format!("HTTP {status} for {symbol}")));
                        continue;
                    }

                    let chart: ChartResponse = resp.json().map_err(|e| {
                        DataError::ResponseFormatChanged(format!(
                            "failed to parse response for {symbol}: {e}"
                        ))
                    })?;

                    return Self::parse_response(symbol, request.adjustment, chart);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(DataError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

fn day_start_ts(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

impl PriceFetcher for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn source(&self) -> DataSource {
        DataSource::YahooFinance
    }

    fn fetch(&self, request: &FetchRequest) -> Result<PriceSeries, DataError> {
        self.fetch_with_retry(request)
    }
}
