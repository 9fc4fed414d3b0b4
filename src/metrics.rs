use crate::error::ModelError;
use crate::models::ModelKind;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use smartcore::metrics;
use statrs::statistics::Statistics;

pub const METRIC_NAMES: [&str; 4] = ["mse", "rmse", "mae", "r2"];

/// Regression error metrics for one model on the test partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl Metrics {
    /// Look a metric up by its name (`mse`, `rmse`, `mae`, `r2`).
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "mse" => Some(self.mse),
            "rmse" => Some(self.rmse),
            "mae" => Some(self.mae),
            "r2" => Some(self.r2),
            _ => None,
        }
    }

    pub fn as_pairs(&self) -> [(&'static str, f64); 4] {
        [
            ("mse", self.mse),
            ("rmse", self.rmse),
            ("mae", self.mae),
            ("r2", self.r2),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub model: ModelKind,
    pub metrics: Metrics,
}

impl EvaluationRecord {
    pub fn new(model: ModelKind, metrics: Metrics) -> Self {
        Self { model, metrics }
    }

    pub fn name(&self) -> &'static str {
        self.model.name()
    }

    pub fn r2(&self) -> f64 {
        self.metrics.r2
    }
}

/// Mean squared error
pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    metrics::mean_squared_error(&y_true.to_vec(), &y_pred.to_vec())
}

/// Mean absolute error
pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    metrics::mean_absolute_error(&y_true.to_vec(), &y_pred.to_vec())
}

/// Coefficient of determination.
///
/// For a constant target the total variance is zero: a perfect prediction
/// scores 1 and anything else scores 0.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.population_variance() == 0.0 {
        return if mean_squared_error(y_true, y_pred) == 0.0 { 1.0 } else { 0.0 };
    }
    metrics::r2(&y_true.to_vec(), &y_pred.to_vec())
}

pub fn evaluate(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Metrics, ModelError> {
    if y_true.is_empty() {
        return Err(ModelError::EmptyInput);
    }
    if y_true.len() != y_pred.len() {
        return Err(ModelError::DimensionMismatch {
            expected: y_true.len(),
            got: y_pred.len(),
        });
    }

    let truth = y_true.to_vec();
    let pred = y_pred.to_vec();
    let mse = mean_squared_error(&truth, &pred);

    Ok(Metrics {
        mse,
        rmse: mse.sqrt(),
        mae: mean_absolute_error(&truth, &pred),
        r2: r2_score(&truth, &pred),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_prediction() {
        let y = array![1.0, 2.0, 3.0];
        let metrics = evaluate(&y, &y).unwrap();
        assert_eq!(metrics.mse, 0.0);
        assert_eq!(metrics.r2, 1.0);
    }

    #[test]
    fn test_known_values() {
        let metrics = evaluate(&array![3.0, -0.5, 2.0, 7.0], &array![2.5, 0.0, 2.0, 8.0]).unwrap();
        assert!((metrics.mse - 0.375).abs() < 1e-12);
        assert!((metrics.mae - 0.5).abs() < 1e-12);
        assert!((metrics.rmse - 0.375f64.sqrt()).abs() < 1e-12);
        assert!((metrics.r2 - 0.948_608_137_044_967_9).abs() < 1e-9);
    }

    #[test]
    fn test_constant_target_r2() {
        let y = array![5.0, 5.0, 5.0];
        assert_eq!(evaluate(&y, &y).unwrap().r2, 1.0);
        assert_eq!(evaluate(&y, &array![5.0, 5.0, 6.0]).unwrap().r2, 0.0);
    }

    #[test]
    fn test_metric_lookup_by_name() {
        let metrics = evaluate(&array![1.0, 2.0], &array![1.0, 3.0]).unwrap();
        assert_eq!(metrics.get("mae"), Some(0.5));
        assert_eq!(metrics.get("sharpe"), None);
        for (name, value) in metrics.as_pairs() {
            assert_eq!(metrics.get(name), Some(value));
        }
    }

    #[test]
    fn test_single_row_r2() {
        assert_eq!(r2_score(&[4.0], &[4.0]), 1.0);
        assert_eq!(r2_score(&[4.0], &[3.0]), 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        let result = evaluate(&array![1.0, 2.0], &array![1.0]);
        assert!(matches!(result, Err(ModelError::DimensionMismatch { .. })));
    }
}
