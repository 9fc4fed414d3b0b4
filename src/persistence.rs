//! Saving and restoring run artifacts: fitted models as JSON, tables as CSV.

use crate::error::{ModelError, PersistenceError};
use crate::market_data::TimeSeriesTable;
use crate::metrics::EvaluationRecord;
use crate::models::{Estimator, ModelKind, Regressor};
use crate::preprocess::Scaler;
use chrono::{DateTime, Utc};
use log::info;
use ndarray::{Array1, Array2};
use polars::prelude::{Column, CsvWriter, DataFrame, SerWriter};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// A fitted model with everything needed to predict from raw features.
#[derive(Debug, Serialize, Deserialize)]
pub struct SavedModel {
    pub model: ModelKind,
    pub symbol: String,
    pub saved_at: DateTime<Utc>,
    pub feature_columns: Vec<String>,
    pub scaler: Scaler,
    pub estimator: Estimator,
}

impl SavedModel {
    /// Scale raw feature rows with the stored scaler, then predict.
    pub fn predict(&self, raw_features: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let scaled = self.scaler.transform(raw_features)?;
        self.estimator.predict(&scaled)
    }
}

/// Output file names for one symbol and day.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub features: PathBuf,
    pub results: PathBuf,
    pub predictions: PathBuf,
}

impl ArtifactPaths {
    pub fn new(output_dir: impl AsRef<Path>, symbol: &str, date: DateTime<Utc>) -> Self {
        let dir = output_dir.as_ref();
        let stamp = date.format("%Y%m%d");
        Self {
            model: dir.join(format!("best_model_{}_{}.json", symbol, stamp)),
            features: dir.join(format!("processed_data_{}_{}.csv", symbol, stamp)),
            results: dir.join(format!("model_results_{}_{}.csv", symbol, stamp)),
            predictions: dir.join(format!("predictions_{}_{}.csv", symbol, stamp)),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn ensure_parent(path: &Path) -> Result<(), PersistenceError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))
        }
        _ => Ok(()),
    }
}

fn write_csv(mut frame: DataFrame, path: &Path) -> Result<(), PersistenceError> {
    ensure_parent(path)?;
    let mut file = File::create(path).map_err(|e| io_error(path, e))?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut frame)?;
    Ok(())
}

pub fn save_model(saved: &SavedModel, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    if !saved.estimator.is_fitted() {
        return Err(ModelError::NotFitted.into());
    }
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(saved)?;
    fs::write(path, json).map_err(|e| io_error(path, e))?;
    info!("Model {} saved to {}", saved.model, path.display());
    Ok(())
}

pub fn load_model(path: impl AsRef<Path>) -> Result<SavedModel, PersistenceError> {
    let path = path.as_ref();
    let json = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    let saved: SavedModel = serde_json::from_str(&json)?;
    if !saved.estimator.is_fitted() {
        return Err(ModelError::NotFitted.into());
    }
    info!("Model {} loaded from {}", saved.model, path.display());
    Ok(saved)
}

pub fn save_feature_table(table: &TimeSeriesTable, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    write_csv(table.to_polars()?, path)?;
    info!("Processed data saved to {}", path.display());
    Ok(())
}

pub fn save_results(records: &[EvaluationRecord], path: impl AsRef<Path>) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    let names: Vec<&str> = records.iter().map(|r| r.name()).collect();
    let metric = |f: fn(&EvaluationRecord) -> f64| -> Vec<f64> { records.iter().map(f).collect() };

    let frame = DataFrame::new(vec![
        Column::new("model".into(), names),
        Column::new("mse".into(), metric(|r| r.metrics.mse)),
        Column::new("rmse".into(), metric(|r| r.metrics.rmse)),
        Column::new("mae".into(), metric(|r| r.metrics.mae)),
        Column::new("r2".into(), metric(|r| r.metrics.r2)),
    ])?;
    write_csv(frame, path)?;
    info!("Model results saved to {}", path.display());
    Ok(())
}

pub fn save_predictions(
    timestamps: &[DateTime<Utc>],
    actual: &[f64],
    predicted: &[f64],
    path: impl AsRef<Path>,
) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    let rows = timestamps.len().min(actual.len()).min(predicted.len());
    let dates: Vec<String> = timestamps[..rows]
        .iter()
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .collect();

    let frame = DataFrame::new(vec![
        Column::new("timestamp".into(), dates),
        Column::new("actual".into(), &actual[..rows]),
        Column::new("predicted".into(), &predicted[..rows]),
    ])?;
    write_csv(frame, path)?;
    info!("Predictions saved to {}", path.display());
    Ok(())
}
