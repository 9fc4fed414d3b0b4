//! Technical indicators over whole columns.
//!
//! Every function returns one value per input row. Rows without enough
//! history are `NaN`.

use crate::market_data::{CLOSE, HIGH, LOW, OPEN, TimeSeriesTable, VOLUME};
use log::{info, warn};
use statrs::statistics::Statistics;
use thiserror::Error;

pub const SMA_WINDOWS: [usize; 2] = [7, 25];
pub const EMA_SPANS: [usize; 2] = [12, 26];
pub const MACD_SIGNAL: usize = 9;
pub const RSI_WINDOW: usize = 14;
pub const STOCH_WINDOW: usize = 14;
pub const STOCH_SMOOTH: usize = 3;
pub const VOLUME_SMA_WINDOW: usize = 20;

/// Lowercase names some sources use for the close and volume columns.
pub const COLUMN_ALIASES: [(&str, &str); 2] = [("price", CLOSE), ("volume", VOLUME)];

/// Rows consumed before every indicator is defined (MACD signal line).
pub const LONGEST_WARMUP: usize = EMA_SPANS[1] + MACD_SIGNAL - 2;

/// A group of indicators skipped because its input columns are missing.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("skipped {indicators:?}: missing column(s) {missing:?}")]
pub struct IndicatorWarning {
    pub indicators: Vec<&'static str>,
    pub missing: Vec<String>,
}

/// Simple moving average.
pub fn sma(values: &[f64], window: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return result;
    }

    for i in (window - 1)..values.len() {
        result[i] = values[i + 1 - window..=i].mean();
    }
    result
}

/// Exponentially weighted mean without bias adjustment:
/// `s_t = alpha * x_t + (1 - alpha) * s_{t-1}`, seeded with the first defined
/// value. Output stays undefined until `min_periods` defined observations
/// have been seen.
pub fn ewm(values: &[f64], alpha: f64, min_periods: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    let mut state: Option<f64> = None;
    let mut seen = 0usize;

    for (i, &value) in values.iter().enumerate() {
        if !value.is_nan() {
            seen += 1;
            state = Some(match state {
                Some(prev) => alpha * value + (1.0 - alpha) * prev,
                None => value,
            });
        }
        if seen >= min_periods.max(1) {
            result[i] = state.unwrap_or(f64::NAN);
        }
    }
    result
}

/// Exponential moving average with `alpha = 2 / (span + 1)`.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    ewm(values, 2.0 / (span as f64 + 1.0), span)
}

/// MACD histogram: MACD line minus its signal line.
pub fn macd_diff(close: &[f64], fast: usize, slow: usize, signal: usize) -> Vec<f64> {
    let fast_ema = ema(close, fast);
    let slow_ema = ema(close, slow);
    let macd: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&macd, signal);

    macd.iter()
        .zip(signal_line.iter())
        .map(|(m, s)| m - s)
        .collect()
}

/// Wilder relative strength index.
pub fn rsi(close: &[f64], window: usize) -> Vec<f64> {
    let mut gains = vec![0.0; close.len()];
    let mut losses = vec![0.0; close.len()];
    for i in 1..close.len() {
        let change = close[i] - close[i - 1];
        if change > 0.0 {
            gains[i] = change;
        } else if change < 0.0 {
            losses[i] = -change;
        }
    }

    let alpha = 1.0 / window as f64;
    let avg_gain = ewm(&gains, alpha, window);
    let avg_loss = ewm(&losses, alpha, window);

    avg_gain
        .iter()
        .zip(avg_loss.iter())
        .map(|(&gain, &loss)| {
            if loss.is_nan() || gain.is_nan() {
                f64::NAN
            } else if loss == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + gain / loss)
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub middle_line: f64,
    pub upper_band: f64,
    pub lower_band: f64,
    pub std_deviation: f64,
}

#[derive(Debug, Clone)]
pub struct BollingerCalculator {
    pub period: usize,
    pub std_multiplier: f64,
}

impl Default for BollingerCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl BollingerCalculator {
    pub fn new() -> Self {
        Self {
            period: 20,
            std_multiplier: 2.0,
        }
    }

    pub fn with_settings(period: usize, std_multiplier: f64) -> Self {
        Self {
            period,
            std_multiplier,
        }
    }

    /// Bands over the last `period` prices
    pub fn calculate_bollinger_bands(&self, prices: &[f64]) -> Option<BollingerBands> {
        if self.period == 0 || prices.len() < self.period {
            return None;
        }

        let recent_prices = &prices[prices.len() - self.period..];
        if recent_prices.iter().any(|p| p.is_nan()) {
            return None;
        }

        let middle_line = recent_prices.mean();
        let std_deviation = recent_prices.population_std_dev();

        Some(BollingerBands {
            middle_line,
            upper_band: middle_line + std_deviation * self.std_multiplier,
            lower_band: middle_line - std_deviation * self.std_multiplier,
            std_deviation,
        })
    }

    /// Bands for every row, using the window ending at that row
    pub fn rolling(&self, prices: &[f64]) -> Vec<Option<BollingerBands>> {
        (0..prices.len())
            .map(|i| self.calculate_bollinger_bands(&prices[..=i]))
            .collect()
    }
}

/// Stochastic oscillator %K and its smoothed %D.
///
/// A window whose high equals its low has no defined %K.
pub fn stochastic(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    window: usize,
    smooth: usize,
) -> (Vec<f64>, Vec<f64>) {
    let n = close.len();
    let mut k = vec![f64::NAN; n];
    if window > 0 && n >= window {
        for i in (window - 1)..n {
            let lowest = low[i + 1 - window..=i]
                .iter()
                .copied()
                .fold(f64::INFINITY, f64::min);
            let highest = high[i + 1 - window..=i]
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            let range = highest - lowest;
            if range > 0.0 {
                k[i] = 100.0 * (close[i] - lowest) / range;
            }
        }
    }
    let d = rolling_mean_strict(&k, smooth);
    (k, d)
}

/// Rolling mean that is undefined when any value in the window is.
fn rolling_mean_strict(values: &[f64], window: usize) -> Vec<f64> {
    let mut result = sma(values, window);
    for (i, v) in result.iter_mut().enumerate() {
        if i + 1 >= window && values[i + 1 - window..=i].iter().any(|x| x.is_nan()) {
            *v = f64::NAN;
        }
    }
    result
}

/// On-balance volume: running sum of volume signed by the close direction.
pub fn on_balance_volume(close: &[f64], volume: &[f64]) -> Vec<f64> {
    let mut total = 0.0;
    close
        .iter()
        .zip(volume.iter())
        .enumerate()
        .map(|(i, (&c, &v))| {
            if i > 0 && c < close[i - 1] {
                total -= v;
            } else {
                total += v;
            }
            total
        })
        .collect()
}

/// Rename alias columns (`price`, `volume`) to `Close`/`Volume` when the
/// canonical column is absent.
pub fn canonical_columns(table: &TimeSeriesTable) -> TimeSeriesTable {
    COLUMN_ALIASES
        .iter()
        .fold(table.clone(), |acc, &(alias, canonical)| {
            if acc.has_column(alias) && !acc.has_column(canonical) {
                info!("Using '{}' column as {}", alias, canonical);
                acc.rename_column(alias, canonical)
            } else {
                acc
            }
        })
}

/// Derive Open/High/Low from Close when the source only provides a close.
///
/// `Open` is the previous close, `High`/`Low` bracket Open and Close by 1%.
/// The first row has no previous close and is dropped.
pub fn synthesize_ohlc(table: &TimeSeriesTable) -> TimeSeriesTable {
    let Some(close) = table.column(CLOSE) else {
        return table.clone();
    };
    if table.has_column(OPEN) {
        return table.clone();
    }

    let open: Vec<f64> = std::iter::once(f64::NAN)
        .chain(close.iter().copied().take(close.len().saturating_sub(1)))
        .collect();
    let high: Vec<f64> = open
        .iter()
        .zip(close.iter())
        .map(|(&o, &c)| nan_max(o, c) * 1.01)
        .collect();
    let low: Vec<f64> = open
        .iter()
        .zip(close.iter())
        .map(|(&o, &c)| nan_min(o, c) * 0.99)
        .collect();

    info!("No OHLC data in source, synthesizing Open/High/Low from Close");
    table
        .clone()
        .with_column(OPEN, open)
        .with_column(HIGH, high)
        .with_column(LOW, low)
        .drop_undefined()
}

fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() { b } else { a.max(b) }
}

fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() { b } else { a.min(b) }
}

/// Add every indicator whose inputs are available.
///
/// Missing inputs are not fatal: the affected group is skipped and reported
/// in the returned warnings.
pub fn add_technical_indicators(table: &TimeSeriesTable) -> (TimeSeriesTable, Vec<IndicatorWarning>) {
    let mut warnings = Vec::new();
    let mut enriched = synthesize_ohlc(&canonical_columns(table));

    let Some(close) = enriched.column(CLOSE).map(<[f64]>::to_vec) else {
        let warning = IndicatorWarning {
            indicators: vec![
                "SMA", "EMA", "MACD", "RSI", "Bollinger", "Stochastic", "Volume_SMA", "OBV",
            ],
            missing: vec![CLOSE.to_string()],
        };
        warn!("Error adding technical indicators: {}", warning);
        warnings.push(warning);
        return (enriched, warnings);
    };

    for window in SMA_WINDOWS {
        enriched = enriched.with_column(format!("SMA_{}", window), sma(&close, window));
    }
    for span in EMA_SPANS {
        enriched = enriched.with_column(format!("EMA_{}", span), ema(&close, span));
    }
    enriched = enriched.with_column(
        "MACD",
        macd_diff(&close, EMA_SPANS[0], EMA_SPANS[1], MACD_SIGNAL),
    );
    enriched = enriched.with_column("RSI", rsi(&close, RSI_WINDOW));

    let bands = BollingerCalculator::new().rolling(&close);
    let band_column = |f: fn(&BollingerBands) -> f64| -> Vec<f64> {
        bands
            .iter()
            .map(|b| b.as_ref().map(f).unwrap_or(f64::NAN))
            .collect()
    };
    enriched = enriched
        .with_column("BB_upper", band_column(|b| b.upper_band))
        .with_column("BB_lower", band_column(|b| b.lower_band))
        .with_column("BB_middle", band_column(|b| b.middle_line));

    match (enriched.column(HIGH), enriched.column(LOW)) {
        (Some(high), Some(low)) => {
            let (k, d) = stochastic(high, low, &close, STOCH_WINDOW, STOCH_SMOOTH);
            enriched = enriched.with_column("Stoch_K", k).with_column("Stoch_D", d);
        }
        (high, low) => {
            let missing = [(HIGH, high.is_none()), (LOW, low.is_none())]
                .iter()
                .filter(|(_, absent)| *absent)
                .map(|(name, _)| name.to_string())
                .collect();
            let warning = IndicatorWarning {
                indicators: vec!["Stoch_K", "Stoch_D"],
                missing,
            };
            warn!("Error adding some technical indicators: {}", warning);
            warnings.push(warning);
        }
    }

    match enriched.column(VOLUME).map(<[f64]>::to_vec) {
        Some(volume) => {
            enriched = enriched
                .with_column("Volume_SMA", sma(&volume, VOLUME_SMA_WINDOW))
                .with_column("OBV", on_balance_volume(&close, &volume));
        }
        None => {
            let warning = IndicatorWarning {
                indicators: vec!["Volume_SMA", "OBV"],
                missing: vec![VOLUME.to_string()],
            };
            warn!("Error adding some technical indicators: {}", warning);
            warnings.push(warning);
        }
    }

    if warnings.is_empty() {
        info!("Technical indicators added successfully");
    }
    (enriched, warnings)
}
