//! Row cleaning: duplicate timestamps, missing values and IQR outliers.

use crate::market_data::TimeSeriesTable;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// How many times the sequential IQR filter runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierPasses {
    /// One pass over the columns. Re-cleaning may trim further rows when the
    /// first pass shifted the quartiles.
    Single,
    /// Repeat the pass until no row is removed, so cleaning is idempotent.
    #[default]
    UntilStable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrFence {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrFence {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let q1 = quantile_sorted(&sorted, 0.25);
        let q3 = quantile_sorted(&sorted, 0.75);
        let iqr = q3 - q1;
        Some(Self {
            q1,
            q3,
            lower: q1 - 1.5 * iqr,
            upper: q3 + 1.5 * iqr,
        })
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Quantile with linear interpolation between closest ranks.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Clean a raw table.
///
/// Rows are sorted by time, duplicate timestamps keep their first row, rows
/// with any missing value are dropped, then each column is IQR-filtered in
/// column order. Each column sees the rows left by the columns before it, so
/// the surviving set depends on that order.
///
/// With [`OutlierPasses::Single`] a second call can remove more rows on
/// heavy-tailed input; the default [`OutlierPasses::UntilStable`] cannot.
pub fn clean(table: &TimeSeriesTable, passes: OutlierPasses) -> TimeSeriesTable {
    let input_rows = table.len();
    let sorted = table.sorted_by_time();

    let keep: Vec<bool> = sorted
        .timestamps()
        .iter()
        .enumerate()
        .map(|(i, ts)| i == 0 || sorted.timestamps()[i - 1] != *ts)
        .collect();
    let mut cleaned = sorted.filter_rows(&keep).drop_undefined();

    loop {
        let (next, removed) = remove_outliers(&cleaned);
        cleaned = next;
        if removed == 0 || passes == OutlierPasses::Single {
            break;
        }
    }

    info!(
        "Data cleaned. {} rows -> {} rows, {} columns",
        input_rows,
        cleaned.len(),
        cleaned.column_names().len()
    );
    cleaned
}

/// One sequential IQR pass over all columns; returns the table and the
/// number of rows removed.
fn remove_outliers(table: &TimeSeriesTable) -> (TimeSeriesTable, usize) {
    let before = table.len();
    let mut current = table.clone();

    for name in table.column_names() {
        let Some(values) = current.column(name) else {
            continue;
        };
        let Some(fence) = IqrFence::from_values(values) else {
            continue;
        };

        let keep: Vec<bool> = values.iter().map(|&v| fence.contains(v)).collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        if dropped > 0 {
            debug!(
                "{}: dropping {} rows outside [{:.4}, {:.4}]",
                name, dropped, fence.lower, fence.upper
            );
            current = current.filter_rows(&keep);
        }
    }

    let removed = before - current.len();
    (current, removed)
}
