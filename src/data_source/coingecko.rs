//! CoinGecko `market_chart` client. Returns close, volume and market cap only;
//! OHLC is synthesized downstream.

use super::{DataSource, KeyFormat, Period};
use crate::error::DataSourceError;
use crate::market_data::{CLOSE, MARKET_CAP, TimeSeriesTable, VOLUME};
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// `[timestamp_ms, value]` pairs
#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<(f64, Option<f64>)>,
    #[serde(default)]
    total_volumes: Vec<(f64, Option<f64>)>,
    #[serde(default)]
    market_caps: Vec<(f64, Option<f64>)>,
}

#[derive(Debug, Clone)]
pub struct CoinGeckoSource {
    client: Client,
    base_url: String,
    vs_currency: String,
}

impl CoinGeckoSource {
    pub fn new(base_url: &str, vs_currency: &str, timeout_secs: u64) -> Result<Self, DataSourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            vs_currency: vs_currency.to_string(),
        })
    }
}

impl DataSource for CoinGeckoSource {
    fn name(&self) -> &'static str {
        "CoinGecko"
    }

    fn key_format(&self) -> KeyFormat {
        KeyFormat::CatalogId
    }

    fn fetch(&self, key: &str, period: Period) -> Result<TimeSeriesTable, DataSourceError> {
        let url = format!("{}/coins/{}/market_chart", self.base_url, key);
        let days = period.days().to_string();
        debug!("Requesting {} ({} days)", url, days);

        let body = self
            .client
            .get(&url)
            .query(&[
                ("vs_currency", self.vs_currency.as_str()),
                ("days", days.as_str()),
                ("interval", "daily"),
            ])
            .send()?
            .error_for_status()?
            .text()?;
        parse_market_chart(&body)
    }
}

fn to_timestamp(ms: f64) -> Result<DateTime<Utc>, DataSourceError> {
    DateTime::<Utc>::from_timestamp_millis(ms as i64)
        .ok_or_else(|| DataSourceError::ParseError(format!("invalid timestamp {}", ms)))
}

/// Values of a secondary series looked up by the price timestamps.
fn by_timestamp(series: &[(f64, Option<f64>)], timestamps_ms: &[i64]) -> Vec<f64> {
    let lookup: HashMap<i64, f64> = series
        .iter()
        .map(|&(ts, v)| (ts as i64, v.unwrap_or(f64::NAN)))
        .collect();
    timestamps_ms
        .iter()
        .map(|ts| lookup.get(ts).copied().unwrap_or(f64::NAN))
        .collect()
}

/// Parse a `market_chart` body into a table sorted by time.
pub fn parse_market_chart(body: &str) -> Result<TimeSeriesTable, DataSourceError> {
    let chart: MarketChart =
        serde_json::from_str(body).map_err(|e| DataSourceError::ParseError(e.to_string()))?;

    let timestamps_ms: Vec<i64> = chart.prices.iter().map(|&(ts, _)| ts as i64).collect();
    let timestamps = chart
        .prices
        .iter()
        .map(|&(ts, _)| to_timestamp(ts))
        .collect::<Result<Vec<_>, _>>()?;
    let close: Vec<f64> = chart
        .prices
        .iter()
        .map(|&(_, v)| v.unwrap_or(f64::NAN))
        .collect();

    let table = TimeSeriesTable::from_columns(
        timestamps,
        vec![
            (CLOSE, close),
            (VOLUME, by_timestamp(&chart.total_volumes, &timestamps_ms)),
            (MARKET_CAP, by_timestamp(&chart.market_caps, &timestamps_ms)),
        ],
    );
    Ok(table.sorted_by_time())
}
