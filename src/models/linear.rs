//! Linear estimators on smartcore: ordinary least squares, ridge and lasso.
//!
//! Inputs arrive standardized, so smartcore's own normalization is off.

use super::{Regressor, backend, check_features, ensure_finite, to_dense};
use crate::error::ModelError;
use log::debug;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::lasso::{Lasso, LassoParameters};
use smartcore::linear::linear_regression::{
    LinearRegression as OlsModel, LinearRegressionParameters, LinearRegressionSolverName,
};
use smartcore::linear::ridge_regression::{
    RidgeRegression as RidgeModel, RidgeRegressionParameters, RidgeRegressionSolverName,
};

type Ols = OlsModel<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type Ridge = RidgeModel<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type LassoModel = Lasso<f64, f64, DenseMatrix<f64>, Vec<f64>>;

fn check_alpha(alpha: f64) -> Result<(), ModelError> {
    if alpha >= 0.0 && alpha.is_finite() {
        Ok(())
    } else {
        Err(ModelError::InvalidParameter(format!(
            "alpha must be non-negative, got {}",
            alpha
        )))
    }
}

fn finite_predictions(values: Vec<f64>) -> Result<Array1<f64>, ModelError> {
    ensure_finite(values.iter())?;
    Ok(Array1::from(values))
}

/// Ordinary least squares. The SVD solver copes with collinear lag and
/// moving-average columns.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LinearRegression {
    n_features: usize,
    model: Option<Ols>,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
        let params = LinearRegressionParameters::default().with_solver(LinearRegressionSolverName::SVD);
        let model = Ols::fit(&to_dense(x)?, &y.to_vec(), params).map_err(backend)?;
        self.n_features = x.ncols();
        self.model = Some(model);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let model = self.model.as_ref().ok_or(ModelError::NotFitted)?;
        check_features(self.n_features, x)?;
        finite_predictions(model.predict(&to_dense(x)?).map_err(backend)?)
    }

    fn is_fitted(&self) -> bool {
        self.model.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub alpha: f64,
    n_features: usize,
    model: Option<Ridge>,
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            n_features: 0,
            model: None,
        }
    }
}

impl Regressor for RidgeRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
        check_alpha(self.alpha)?;
        let params = RidgeRegressionParameters::default()
            .with_alpha(self.alpha)
            .with_solver(RidgeRegressionSolverName::Cholesky)
            .with_normalize(false);
        let model = Ridge::fit(&to_dense(x)?, &y.to_vec(), params).map_err(backend)?;
        self.n_features = x.ncols();
        self.model = Some(model);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let model = self.model.as_ref().ok_or(ModelError::NotFitted)?;
        check_features(self.n_features, x)?;
        finite_predictions(model.predict(&to_dense(x)?).map_err(backend)?)
    }

    fn is_fitted(&self) -> bool {
        self.model.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LassoRegression {
    pub alpha: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    n_features: usize,
    model: Option<LassoModel>,
}

impl LassoRegression {
    pub fn new(alpha: f64, max_iter: usize, tolerance: f64) -> Self {
        Self {
            alpha,
            max_iter,
            tolerance,
            n_features: 0,
            model: None,
        }
    }
}

impl Regressor for LassoRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
        check_alpha(self.alpha)?;
        if self.max_iter == 0 {
            return Err(ModelError::InvalidParameter("max_iter must be positive".into()));
        }
        let params = LassoParameters::default()
            .with_alpha(self.alpha)
            .with_normalize(false)
            .with_tol(self.tolerance)
            .with_max_iter(self.max_iter);
        let model = LassoModel::fit(&to_dense(x)?, &y.to_vec(), params).map_err(backend)?;
        debug!("Lasso fitted on {} features, alpha {}", x.ncols(), self.alpha);
        self.n_features = x.ncols();
        self.model = Some(model);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let model = self.model.as_ref().ok_or(ModelError::NotFitted)?;
        check_features(self.n_features, x)?;
        finite_predictions(model.predict(&to_dense(x)?).map_err(backend)?)
    }

    fn is_fitted(&self) -> bool {
        self.model.is_some()
    }
}
