//! Time-ordered train/test split and feature scaling.

use crate::config::SplitConfig;
use crate::error::{ModelError, PipelineError};
use crate::features::future_column_name;
use crate::market_data::TimeSeriesTable;
use chrono::{DateTime, Utc};
use log::info;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerKind {
    /// Zero mean, unit population variance
    #[default]
    Standard,
    /// Rescale to [0, 1]
    MinMax,
}

/// Per-column affine transform `(x - offset) / scale`, fit once on train.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub kind: ScalerKind,
    pub offset: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Scaler {
    pub fn fit(kind: ScalerKind, x: &Array2<f64>) -> Self {
        let (offset, scale) = x
            .axis_iter(Axis(1))
            .map(|column| {
                let values = column.to_vec();
                if values.is_empty() {
                    return (0.0, 1.0);
                }
                let (offset, spread) = match kind {
                    ScalerKind::Standard => {
                        let mean = values.iter().mean();
                        (mean, values.iter().population_std_dev())
                    }
                    ScalerKind::MinMax => {
                        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                        (min, max - min)
                    }
                };
                // constant column: only center it
                let scale = if spread > 0.0 && spread.is_finite() {
                    spread
                } else {
                    1.0
                };
                (offset, scale)
            })
            .unzip();

        Self {
            kind,
            offset,
            scale,
        }
    }

    pub fn n_features(&self) -> usize {
        self.offset.len()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        if x.ncols() != self.n_features() {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features(),
                got: x.ncols(),
            });
        }
        let offset = Array1::from(self.offset.clone());
        let scale = Array1::from(self.scale.clone());
        Ok((x - &offset) / &scale)
    }
}

/// Scaled matrices and raw targets for one time-ordered split.
#[derive(Debug, Clone)]
pub struct SplitData {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    pub feature_columns: Vec<String>,
    pub scaler: Scaler,
    pub train_timestamps: Vec<DateTime<Utc>>,
    pub test_timestamps: Vec<DateTime<Utc>>,
}

/// Number of test rows: the fraction of `n`, rounded up.
pub fn test_size(n: usize, test_fraction: f64) -> usize {
    (test_fraction * n as f64).ceil() as usize
}

/// Every column except the target and its forward-shifted copy.
pub fn feature_columns(table: &TimeSeriesTable, target: &str, horizon: usize) -> Vec<String> {
    let future = future_column_name(target, horizon);
    table
        .column_names()
        .iter()
        .filter(|name| name.as_str() != target && **name != future)
        .cloned()
        .collect()
}

fn to_matrix(table: &TimeSeriesTable, columns: &[String]) -> Array2<f64> {
    let data: Vec<&[f64]> = columns
        .iter()
        .filter_map(|name| table.column(name))
        .collect();
    Array2::from_shape_fn((table.len(), data.len()), |(i, j)| data[j][i])
}

pub fn split_and_scale(
    table: &TimeSeriesTable,
    target: &str,
    horizon: usize,
    config: &SplitConfig,
) -> Result<SplitData, PipelineError> {
    let future = future_column_name(target, horizon);
    let y = table
        .column(&future)
        .ok_or_else(|| PipelineError::MissingColumn(future.clone()))?;

    let n = table.len();
    let n_test = test_size(n, config.test_fraction);
    if n_test == 0 || n_test >= n {
        return Err(PipelineError::InsufficientData(format!(
            "{} rows cannot be split with test fraction {}",
            n, config.test_fraction
        )));
    }
    let n_train = n - n_test;

    let columns = feature_columns(table, target, horizon);
    let x = to_matrix(table, &columns);
    let x_train_raw = x.slice(ndarray::s![..n_train, ..]).to_owned();
    let x_test_raw = x.slice(ndarray::s![n_train.., ..]).to_owned();

    let scaler = Scaler::fit(config.scaler, &x_train_raw);
    let x_train = scaler
        .transform(&x_train_raw)
        .map_err(|e| PipelineError::InsufficientData(e.to_string()))?;
    let x_test = scaler
        .transform(&x_test_raw)
        .map_err(|e| PipelineError::InsufficientData(e.to_string()))?;

    info!(
        "Split data: {} training rows, {} test rows, {} features",
        n_train,
        n_test,
        columns.len()
    );

    Ok(SplitData {
        x_train,
        x_test,
        y_train: Array1::from(y[..n_train].to_vec()),
        y_test: Array1::from(y[n_train..].to_vec()),
        feature_columns: columns,
        scaler,
        train_timestamps: table.timestamps()[..n_train].to_vec(),
        test_timestamps: table.timestamps()[n_train..].to_vec(),
    })
}
