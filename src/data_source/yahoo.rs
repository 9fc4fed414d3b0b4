//! Yahoo Finance chart API client for daily OHLCV bars.

use super::{DataSource, KeyFormat, Period};
use crate::error::DataSourceError;
use crate::market_data::{CLOSE, HIGH, LOW, OPEN, TimeSeriesTable, VOLUME};
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; cryptoforecast)";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct YahooFinanceSource {
    client: Client,
    base_url: String,
}

impl YahooFinanceSource {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, DataSourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl DataSource for YahooFinanceSource {
    fn name(&self) -> &'static str {
        "Yahoo Finance"
    }

    fn key_format(&self) -> KeyFormat {
        KeyFormat::Ticker
    }

    fn fetch(&self, key: &str, period: Period) -> Result<TimeSeriesTable, DataSourceError> {
        let url = format!(
            "{}/v8/finance/chart/{}?range={}&interval=1d",
            self.base_url,
            key,
            period.as_str()
        );
        debug!("Requesting {}", url);

        let body = self.client.get(&url).send()?.error_for_status()?.text()?;
        parse_chart(key, &body)
    }
}

/// Align a quote series to the timestamp count; nulls and short series
/// become undefined.
fn align(values: &[Option<f64>], len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| values.get(i).copied().flatten().unwrap_or(f64::NAN))
        .collect()
}

/// Parse a chart response body into a table sorted by time.
pub fn parse_chart(key: &str, body: &str) -> Result<TimeSeriesTable, DataSourceError> {
    let response: ChartResponse =
        serde_json::from_str(body).map_err(|e| DataSourceError::ParseError(e.to_string()))?;

    if let Some(error) = response.chart.error {
        return Err(DataSourceError::ParseError(format!(
            "{}: {}",
            error.code, error.description
        )));
    }
    let result = response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| DataSourceError::Empty(key.to_string()))?;

    let timestamps = result
        .timestamp
        .iter()
        .map(|&secs| {
            DateTime::<Utc>::from_timestamp(secs, 0)
                .ok_or_else(|| DataSourceError::ParseError(format!("invalid timestamp {}", secs)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let n = timestamps.len();
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let table = TimeSeriesTable::from_columns(
        timestamps,
        vec![
            (OPEN, align(&quote.open, n)),
            (HIGH, align(&quote.high, n)),
            (LOW, align(&quote.low, n)),
            (CLOSE, align(&quote.close, n)),
            (VOLUME, align(&quote.volume, n)),
        ],
    );
    Ok(table.sorted_by_time())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "BTC-USD"},
                "timestamp": [1704153600, 1704067200],
                "indicators": {"quote": [{
                    "open": [44100.0, 42200.0],
                    "high": [45500.0, null],
                    "low": [44000.0, 42100.0],
                    "close": [44950.0, 44150.0],
                    "volume": [3.1e10, 2.9e10]
                }]}
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_parse_chart_sorts_and_maps_nulls() {
        let table = parse_chart("BTC-USD", BODY).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.is_strictly_increasing());
        assert_eq!(table.column(CLOSE).unwrap(), &[44150.0, 44950.0]);
        assert!(table.column(HIGH).unwrap()[0].is_nan());
        assert_eq!(table.column(HIGH).unwrap()[1], 45500.0);
    }

    #[test]
    fn test_parse_chart_error_payload() {
        let body = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        let err = parse_chart("FOO-USD", body).unwrap_err();
        assert!(matches!(err, DataSourceError::ParseError(msg) if msg.contains("delisted")));
    }

    #[test]
    fn test_parse_chart_rejects_garbage() {
        assert!(matches!(
            parse_chart("BTC-USD", "<html>"),
            Err(DataSourceError::ParseError(_))
        ));
    }
}
