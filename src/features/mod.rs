//! Feature pipeline: clean, enrich, lag, target, finalize.

pub mod clean;
pub mod indicators;

use crate::config::FeatureConfig;
use crate::error::PipelineError;
use crate::market_data::TimeSeriesTable;
use indicators::IndicatorWarning;
use log::info;

/// Feature table ready for splitting, plus any indicator groups skipped.
#[derive(Debug, Clone)]
pub struct PreparedFeatures {
    pub table: TimeSeriesTable,
    pub warnings: Vec<IndicatorWarning>,
}

pub fn lag_column_name(target: &str, lag: usize) -> String {
    format!("{}_lag_{}", target, lag)
}

pub fn future_column_name(target: &str, horizon: usize) -> String {
    format!("{}_future_{}d", target, horizon)
}

/// Value `offset` rows earlier (positive) or later (negative).
pub fn shift(values: &[f64], offset: isize) -> Vec<f64> {
    let n = values.len() as isize;
    (0..n)
        .map(|i| {
            let src = i - offset;
            if (0..n).contains(&src) {
                values[src as usize]
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Add `{target}_lag_{k}` for every configured lag.
pub fn add_lag_features(
    table: TimeSeriesTable,
    target: &str,
    lags: &[usize],
) -> Result<TimeSeriesTable, PipelineError> {
    let values = table
        .column(target)
        .ok_or_else(|| PipelineError::MissingColumn(target.to_string()))?
        .to_vec();

    Ok(lags.iter().fold(table, |acc, &lag| {
        acc.with_column(lag_column_name(target, lag), shift(&values, lag as isize))
    }))
}

/// Add the target value `horizon` rows ahead as `{target}_future_{h}d`.
pub fn add_target(
    table: TimeSeriesTable,
    target: &str,
    horizon: usize,
) -> Result<TimeSeriesTable, PipelineError> {
    let values = table
        .column(target)
        .ok_or_else(|| PipelineError::MissingColumn(target.to_string()))?;
    let future = shift(values, -(horizon as isize));
    Ok(table.with_column(future_column_name(target, horizon), future))
}

/// Drop every row with an undefined value.
pub fn finalize(table: &TimeSeriesTable) -> Result<TimeSeriesTable, PipelineError> {
    let finalized = table.drop_undefined();
    if finalized.is_empty() {
        return Err(PipelineError::InsufficientData(format!(
            "no usable rows remain out of {} after feature engineering",
            table.len()
        )));
    }
    Ok(finalized)
}

pub fn prepare_features(
    raw: &TimeSeriesTable,
    config: &FeatureConfig,
) -> Result<PreparedFeatures, PipelineError> {
    let cleaned = clean::clean(raw, config.outlier_passes);
    let (enriched, warnings) = indicators::add_technical_indicators(&cleaned);
    let lagged = add_lag_features(enriched, &config.target_column, &config.lags)?;
    let targeted = add_target(lagged, &config.target_column, config.horizon)?;
    let table = finalize(&targeted)?;

    info!(
        "Features prepared: {} rows x {} columns",
        table.len(),
        table.column_names().len()
    );
    Ok(PreparedFeatures { table, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{CLOSE, VOLUME};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn days(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    fn series(n: usize) -> TimeSeriesTable {
        let close: Vec<f64> = (0..n)
            .map(|i| 100.0 + i as f64 * 0.5 + (i as f64 * 0.3).sin() * 2.0)
            .collect();
        let volume: Vec<f64> = (0..n).map(|i| 1000.0 + (i % 7) as f64 * 10.0).collect();
        TimeSeriesTable::from_columns(days(n), vec![(CLOSE, close), (VOLUME, volume)])
    }

    #[test]
    fn test_shift_both_directions() {
        let v = [1.0, 2.0, 3.0];
        let back = shift(&v, 1);
        assert!(back[0].is_nan());
        assert_eq!(&back[1..], &[1.0, 2.0]);
        let ahead = shift(&v, -1);
        assert_eq!(&ahead[..2], &[2.0, 3.0]);
        assert!(ahead[2].is_nan());
    }

    #[test]
    fn test_prepare_features_has_no_undefined_values() {
        let prepared = prepare_features(&series(120), &FeatureConfig::default()).unwrap();
        let table = prepared.table;

        assert!(prepared.warnings.is_empty());
        assert_eq!(table.count_undefined(), 0);
        assert!(table.has_column("Close_lag_10"));
        assert!(table.has_column("Close_future_1d"));
        assert!(table.has_column("OBV"));
        // synthesized Open drops one row, MACD warm-up and the horizon the rest
        assert_eq!(table.len(), 120 - 1 - indicators::LONGEST_WARMUP - 1);
    }

    #[test]
    fn test_target_is_next_close() {
        let prepared = prepare_features(&series(80), &FeatureConfig::default()).unwrap();
        let close = prepared.table.column(CLOSE).unwrap();
        let future = prepared.table.column("Close_future_1d").unwrap();
        for i in 0..close.len() - 1 {
            assert_eq!(future[i], close[i + 1]);
        }
    }

    #[test]
    fn test_five_rows_is_insufficient() {
        let result = prepare_features(&series(5), &FeatureConfig::default());
        assert!(matches!(result, Err(PipelineError::InsufficientData(_))));
    }

    #[test]
    fn test_lowercase_price_and_volume_columns() {
        let canonical = series(120);
        let lowercase = TimeSeriesTable::from_columns(
            days(120),
            vec![
                ("price", canonical.column(CLOSE).unwrap().to_vec()),
                ("volume", canonical.column(VOLUME).unwrap().to_vec()),
            ],
        );

        let prepared = prepare_features(&lowercase, &FeatureConfig::default()).unwrap();
        let expected = prepare_features(&canonical, &FeatureConfig::default()).unwrap();
        assert!(prepared.warnings.is_empty());
        assert!(prepared.table.has_column("Close_lag_10"));
        assert!(prepared.table.has_column("OBV"));
        assert_eq!(prepared.table, expected.table);
    }

    #[test]
    fn test_missing_target_column() {
        let table = TimeSeriesTable::from_columns(days(50), vec![(VOLUME, vec![1.0; 50])]);
        let result = prepare_features(&table, &FeatureConfig::default());
        assert!(matches!(result, Err(PipelineError::MissingColumn(c)) if c == "Close"));
    }
}
