//! Historical price sources and ticker translation between them.

pub mod coingecko;
pub mod yahoo;

pub use coingecko::CoinGeckoSource;
pub use yahoo::YahooFinanceSource;

use crate::error::{DataSourceError, PipelineError};
use crate::market_data::TimeSeriesTable;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How far back to fetch daily history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[default]
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
}

impl Period {
    pub const ALL: [Period; 5] = [
        Period::OneMonth,
        Period::ThreeMonths,
        Period::SixMonths,
        Period::OneYear,
        Period::TwoYears,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneMonth => "1mo",
            Period::ThreeMonths => "3mo",
            Period::SixMonths => "6mo",
            Period::OneYear => "1y",
            Period::TwoYears => "2y",
        }
    }

    pub fn days(&self) -> u32 {
        match self {
            Period::OneMonth => 30,
            Period::ThreeMonths => 90,
            Period::SixMonths => 180,
            Period::OneYear => 365,
            Period::TwoYears => 730,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                format!("unknown period '{}', expected one of 1mo, 3mo, 6mo, 1y, 2y", s)
            })
    }
}

/// The kind of key a source understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// Exchange-style ticker such as `BTC-USD`
    Ticker,
    /// Catalog identifier such as `bitcoin`
    CatalogId,
}

#[cfg_attr(test, mockall::automock)]
pub trait DataSource {
    fn name(&self) -> &'static str;

    fn key_format(&self) -> KeyFormat;

    /// Daily history for `key`, sorted by timestamp.
    fn fetch(&self, key: &str, period: Period) -> Result<TimeSeriesTable, DataSourceError>;
}

const KNOWN_COINS: [(&str, &str); 9] = [
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("ADA", "cardano"),
    ("XRP", "ripple"),
    ("DOGE", "dogecoin"),
    ("LTC", "litecoin"),
    ("BNB", "binancecoin"),
    ("DOT", "polkadot"),
];

const QUOTE_SUFFIXES: [&str; 2] = ["-USDT", "-USD"];

/// Maps exchange tickers to catalog ids.
#[derive(Debug, Clone)]
pub struct SymbolTranslator {
    table: HashMap<String, String>,
}

impl SymbolTranslator {
    pub fn new() -> Self {
        let table = KNOWN_COINS
            .iter()
            .map(|(base, id)| (base.to_string(), id.to_string()))
            .collect();
        Self { table }
    }

    /// Known table extended (or overridden) by `overrides`, keyed by base asset.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut translator = Self::new();
        for (base, id) in overrides {
            translator.table.insert(base.to_uppercase(), id.clone());
        }
        translator
    }

    /// `BTC-USD` -> `BTC`
    pub fn base_asset(ticker: &str) -> String {
        let upper = ticker.trim().to_uppercase();
        QUOTE_SUFFIXES
            .iter()
            .find_map(|suffix| upper.strip_suffix(suffix))
            .unwrap_or(&upper)
            .to_string()
    }

    pub fn translate(&self, ticker: &str) -> Result<String, DataSourceError> {
        let base = Self::base_asset(ticker);
        self.table
            .get(&base)
            .cloned()
            .ok_or_else(|| DataSourceError::UnmappedSymbol(ticker.to_string()))
    }
}

impl Default for SymbolTranslator {
    fn default() -> Self {
        Self::new()
    }
}

fn fetch_non_empty(
    source: &dyn DataSource,
    key: &str,
    period: Period,
) -> Result<TimeSeriesTable, DataSourceError> {
    let table = source.fetch(key, period)?;
    if table.is_empty() {
        return Err(DataSourceError::Empty(key.to_string()));
    }
    info!("Fetched {} rows for {} from {}", table.len(), key, source.name());
    Ok(table)
}

fn key_for(
    source: &dyn DataSource,
    translator: &SymbolTranslator,
    symbol: &str,
) -> Result<String, DataSourceError> {
    match source.key_format() {
        KeyFormat::Ticker => Ok(symbol.to_string()),
        KeyFormat::CatalogId => translator.translate(symbol),
    }
}

/// Fetch from `primary`, falling back to `fallback` when the primary fails or
/// returns no rows. `symbol` is always a ticker; it is translated for sources
/// keyed by catalog id.
pub fn fetch_with_fallback(
    primary: &dyn DataSource,
    fallback: &dyn DataSource,
    translator: &SymbolTranslator,
    symbol: &str,
    period: Period,
) -> Result<TimeSeriesTable, PipelineError> {
    info!("Collecting data for {} for period {}", symbol, period);

    let primary_err = match key_for(primary, translator, symbol)
        .and_then(|key| fetch_non_empty(primary, &key, period))
    {
        Ok(table) => return Ok(table),
        Err(e) => e,
    };
    warn!(
        "{} data collection failed ({}), trying {}...",
        primary.name(),
        primary_err,
        fallback.name()
    );

    match key_for(fallback, translator, symbol).and_then(|key| fetch_non_empty(fallback, &key, period)) {
        Ok(table) => Ok(table),
        Err(fallback_err) => Err(PipelineError::DataUnavailable {
            symbol: symbol.to_string(),
            primary: primary_err.to_string(),
            fallback: fallback_err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::CLOSE;
    use chrono::{TimeZone, Utc};
    use mockall::predicate::eq;

    fn one_row() -> TimeSeriesTable {
        let ts = vec![Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()];
        TimeSeriesTable::from_columns(ts, vec![(CLOSE, vec![42_000.0])])
    }

    fn ticker_source(name: &'static str) -> MockDataSource {
        let mut source = MockDataSource::new();
        source.expect_name().return_const(name);
        source.expect_key_format().return_const(KeyFormat::Ticker);
        source
    }

    fn catalog_source(name: &'static str) -> MockDataSource {
        let mut source = MockDataSource::new();
        source.expect_name().return_const(name);
        source.expect_key_format().return_const(KeyFormat::CatalogId);
        source
    }

    #[test]
    fn test_period_round_trip() {
        for period in Period::ALL {
            assert_eq!(period.as_str().parse::<Period>().unwrap(), period);
        }
        assert_eq!(Period::SixMonths.days(), 180);
        assert!("5y".parse::<Period>().is_err());
    }

    #[test]
    fn test_translator_strips_quote_and_case() {
        let translator = SymbolTranslator::new();
        assert_eq!(translator.translate("BTC-USD").unwrap(), "bitcoin");
        assert_eq!(translator.translate("eth-usdt").unwrap(), "ethereum");
        assert_eq!(translator.translate("DOGE").unwrap(), "dogecoin");
        assert!(matches!(
            translator.translate("FOO-USD"),
            Err(DataSourceError::UnmappedSymbol(_))
        ));
    }

    #[test]
    fn test_translator_overrides() {
        let overrides = HashMap::from([("avax".to_string(), "avalanche-2".to_string())]);
        let translator = SymbolTranslator::with_overrides(&overrides);
        assert_eq!(translator.translate("AVAX-USD").unwrap(), "avalanche-2");
        assert_eq!(translator.translate("BTC-USD").unwrap(), "bitcoin");
    }

    #[test]
    fn test_primary_success_skips_fallback() {
        let mut primary = ticker_source("primary");
        primary
            .expect_fetch()
            .with(eq("BTC-USD"), eq(Period::OneYear))
            .times(1)
            .returning(|_, _| Ok(one_row()));
        let mut fallback = catalog_source("fallback");
        fallback.expect_fetch().never();

        let table = fetch_with_fallback(
            &primary,
            &fallback,
            &SymbolTranslator::new(),
            "BTC-USD",
            Period::OneYear,
        )
        .unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_empty_primary_uses_translated_fallback() {
        let mut primary = ticker_source("primary");
        primary
            .expect_fetch()
            .returning(|_, _| Ok(TimeSeriesTable::default()));
        let mut fallback = catalog_source("fallback");
        fallback
            .expect_fetch()
            .with(eq("ethereum"), eq(Period::ThreeMonths))
            .times(1)
            .returning(|_, _| Ok(one_row()));

        let table = fetch_with_fallback(
            &primary,
            &fallback,
            &SymbolTranslator::new(),
            "ETH-USD",
            Period::ThreeMonths,
        )
        .unwrap();
        assert_eq!(table.column(CLOSE).unwrap(), &[42_000.0]);
    }

    #[test]
    fn test_unmapped_symbol_is_data_unavailable() {
        let mut primary = ticker_source("primary");
        primary
            .expect_fetch()
            .returning(|key, _| Err(DataSourceError::Empty(key.to_string())));
        let mut fallback = catalog_source("fallback");
        fallback.expect_fetch().never();

        let err = fetch_with_fallback(
            &primary,
            &fallback,
            &SymbolTranslator::new(),
            "FOO-USD",
            Period::OneYear,
        )
        .unwrap_err();
        match err {
            PipelineError::DataUnavailable { symbol, fallback, .. } => {
                assert_eq!(symbol, "FOO-USD");
                assert!(fallback.contains("FOO-USD"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
