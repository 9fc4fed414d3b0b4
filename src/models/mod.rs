//! Regression estimators and the fixed model catalogue.

pub mod boosting;
pub mod forest;
pub mod linear;
pub mod mlp;
pub mod svr;
pub mod tree;

use crate::config::ModelBankConfig;
use crate::error::ModelError;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use smartcore::error::Failed;
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fmt;
use std::str::FromStr;

pub use boosting::GradientBoosting;
pub use forest::RandomForest;
pub use linear::{LassoRegression, LinearRegression, RidgeRegression};
pub use mlp::MlpRegressor;
pub use svr::SupportVectorRegressor;

/// Names of the catalogue entries, in training order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LinearRegression,
    RidgeRegression,
    LassoRegression,
    RandomForest,
    GradientBoosting,
    Svr,
    NeuralNetwork,
}

impl ModelKind {
    pub const ALL: [ModelKind; 7] = [
        ModelKind::LinearRegression,
        ModelKind::RidgeRegression,
        ModelKind::LassoRegression,
        ModelKind::RandomForest,
        ModelKind::GradientBoosting,
        ModelKind::Svr,
        ModelKind::NeuralNetwork,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "Linear_Regression",
            ModelKind::RidgeRegression => "Ridge_Regression",
            ModelKind::LassoRegression => "Lasso_Regression",
            ModelKind::RandomForest => "Random_Forest",
            ModelKind::GradientBoosting => "Gradient_Boosting",
            ModelKind::Svr => "SVR",
            ModelKind::NeuralNetwork => "Neural_Network",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ModelError;

    /// Accepts display names (`Random_Forest`) and snake case (`random_forest`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ModelError::NotTrained(s.to_string()))
    }
}

/// A regression estimator: fit once, then predict.
pub trait Regressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError>;

    fn is_fitted(&self) -> bool;
}

/// Capability of estimators that can attribute predictive power to inputs.
pub trait FeatureImportance {
    /// One non-negative score per feature, summing to 1 when any split was made.
    fn feature_importances(&self) -> &[f64];
}

/// Any catalogue estimator, fitted or not.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum Estimator {
    Linear(LinearRegression),
    Ridge(RidgeRegression),
    Lasso(LassoRegression),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
    Svr(SupportVectorRegressor),
    NeuralNetwork(MlpRegressor),
}

impl Estimator {
    /// Unfitted estimator for `kind` with hyper-parameters from `config`.
    pub fn build(kind: ModelKind, config: &ModelBankConfig) -> Self {
        match kind {
            ModelKind::LinearRegression => Estimator::Linear(LinearRegression::new()),
            ModelKind::RidgeRegression => Estimator::Ridge(RidgeRegression::new(config.ridge_alpha)),
            ModelKind::LassoRegression => Estimator::Lasso(LassoRegression::new(
                config.lasso_alpha,
                config.lasso_max_iter,
                1e-4,
            )),
            ModelKind::RandomForest => Estimator::RandomForest(RandomForest::new(
                config.forest_trees,
                config.forest_max_depth,
                config.seed,
            )),
            ModelKind::GradientBoosting => Estimator::GradientBoosting(GradientBoosting::new(
                config.boosting_stages,
                config.boosting_learning_rate,
                config.boosting_max_depth,
                config.seed,
            )),
            ModelKind::Svr => {
                Estimator::Svr(SupportVectorRegressor::new(config.svr_c, config.svr_epsilon))
            }
            ModelKind::NeuralNetwork => Estimator::NeuralNetwork(MlpRegressor::new(
                config.mlp_hidden_layers.clone(),
                config.mlp_learning_rate,
                config.mlp_max_epochs,
                config.seed,
            )),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Estimator::Linear(_) => ModelKind::LinearRegression,
            Estimator::Ridge(_) => ModelKind::RidgeRegression,
            Estimator::Lasso(_) => ModelKind::LassoRegression,
            Estimator::RandomForest(_) => ModelKind::RandomForest,
            Estimator::GradientBoosting(_) => ModelKind::GradientBoosting,
            Estimator::Svr(_) => ModelKind::Svr,
            Estimator::NeuralNetwork(_) => ModelKind::NeuralNetwork,
        }
    }

    fn regressor(&self) -> &dyn Regressor {
        match self {
            Estimator::Linear(m) => m,
            Estimator::Ridge(m) => m,
            Estimator::Lasso(m) => m,
            Estimator::RandomForest(m) => m,
            Estimator::GradientBoosting(m) => m,
            Estimator::Svr(m) => m,
            Estimator::NeuralNetwork(m) => m,
        }
    }

    fn regressor_mut(&mut self) -> &mut dyn Regressor {
        match self {
            Estimator::Linear(m) => m,
            Estimator::Ridge(m) => m,
            Estimator::Lasso(m) => m,
            Estimator::RandomForest(m) => m,
            Estimator::GradientBoosting(m) => m,
            Estimator::Svr(m) => m,
            Estimator::NeuralNetwork(m) => m,
        }
    }

    /// `Some` only for estimators with impurity-based importances.
    pub fn as_feature_importance(&self) -> Option<&dyn FeatureImportance> {
        match self {
            Estimator::RandomForest(m) => Some(m),
            Estimator::GradientBoosting(m) => Some(m),
            _ => None,
        }
    }
}

impl Regressor for Estimator {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
        validate_training_input(x, y)?;
        self.regressor_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let predictions = self.regressor().predict(x)?;
        ensure_finite(predictions.iter())?;
        Ok(predictions)
    }

    fn is_fitted(&self) -> bool {
        self.regressor().is_fitted()
    }
}

/// Reject empty, ragged or non-finite training data.
pub fn validate_training_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(ModelError::EmptyInput);
    }
    if x.nrows() != y.len() {
        return Err(ModelError::DimensionMismatch {
            expected: x.nrows(),
            got: y.len(),
        });
    }
    ensure_finite(x.iter().chain(y.iter()))
}

pub fn ensure_finite<'a>(values: impl IntoIterator<Item = &'a f64>) -> Result<(), ModelError> {
    if values.into_iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ModelError::NonFinite)
    }
}

/// Row-major copy of `x` in smartcore's matrix type.
pub(crate) fn to_dense(x: &Array2<f64>) -> Result<DenseMatrix<f64>, ModelError> {
    let rows: Vec<Vec<f64>> = x.outer_iter().map(|row| row.to_vec()).collect();
    DenseMatrix::from_2d_vec(&rows).map_err(backend)
}

pub(crate) fn backend(e: Failed) -> ModelError {
    ModelError::Backend(e.to_string())
}

/// Column count guard shared by every `predict`.
pub(crate) fn check_features(expected: usize, x: &Array2<f64>) -> Result<(), ModelError> {
    if x.ncols() != expected {
        return Err(ModelError::DimensionMismatch {
            expected,
            got: x.ncols(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_catalogue_names_and_order() {
        let names: Vec<&str> = ModelKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(
            names,
            vec![
                "Linear_Regression",
                "Ridge_Regression",
                "Lasso_Regression",
                "Random_Forest",
                "Gradient_Boosting",
                "SVR",
                "Neural_Network"
            ]
        );
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("Random_Forest".parse::<ModelKind>().unwrap(), ModelKind::RandomForest);
        assert_eq!("svr".parse::<ModelKind>().unwrap(), ModelKind::Svr);
        assert!("XGBoost".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_build_matches_kind() {
        let config = ModelBankConfig::default();
        for kind in ModelKind::ALL {
            let estimator = Estimator::build(kind, &config);
            assert_eq!(estimator.kind(), kind);
            assert!(!estimator.is_fitted());
        }
    }

    #[test]
    fn test_importance_capability() {
        let config = ModelBankConfig::default();
        let with: Vec<ModelKind> = ModelKind::ALL
            .iter()
            .copied()
            .filter(|&k| Estimator::build(k, &config).as_feature_importance().is_some())
            .collect();
        assert_eq!(with, vec![ModelKind::RandomForest, ModelKind::GradientBoosting]);
    }

    #[test]
    fn test_validate_training_input() {
        let x = array![[1.0], [2.0]];
        assert!(validate_training_input(&x, &array![1.0, 2.0]).is_ok());
        assert_eq!(
            validate_training_input(&x, &array![1.0]),
            Err(ModelError::DimensionMismatch { expected: 2, got: 1 })
        );
        assert_eq!(
            validate_training_input(&x, &array![1.0, f64::NAN]),
            Err(ModelError::NonFinite)
        );
        assert_eq!(
            validate_training_input(&Array2::zeros((0, 1)), &Array1::zeros(0)),
            Err(ModelError::EmptyInput)
        );
    }

    #[test]
    fn test_unfitted_predict_fails() {
        let estimator = Estimator::build(ModelKind::RidgeRegression, &ModelBankConfig::default());
        assert_eq!(estimator.predict(&array![[1.0]]), Err(ModelError::NotFitted));
    }
}
