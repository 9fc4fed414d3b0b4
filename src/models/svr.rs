//! Epsilon-insensitive support vector regression with an RBF kernel.
//!
//! The dual is solved by coordinate descent with the bias folded into the
//! kernel (`K + 1`), which removes the equality constraint: each update is
//! `beta_i = clip(soft(y_i - s_i, eps) / K_ii, -C, C)` where `s_i` is the
//! contribution of every other coefficient.

use super::{Regressor, check_features, ensure_finite};
use crate::error::ModelError;
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

const MAX_SWEEPS: usize = 1000;
const TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportVectorRegressor {
    pub c: f64,
    pub epsilon: f64,
    /// Kernel width; `None` picks `1 / (n_features * Var(X))` at fit time
    pub gamma: Option<f64>,
    fitted_gamma: f64,
    support_vectors: Option<Array2<f64>>,
    dual_coef: Array1<f64>,
}

impl SupportVectorRegressor {
    pub fn new(c: f64, epsilon: f64) -> Self {
        Self {
            c,
            epsilon,
            gamma: None,
            fitted_gamma: 0.0,
            support_vectors: None,
            dual_coef: Array1::zeros(0),
        }
    }

    pub fn n_support(&self) -> usize {
        self.dual_coef.len()
    }

    fn rbf(gamma: f64, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let dist: f64 = a.iter().zip(b.iter()).map(|(p, q)| (p - q).powi(2)).sum();
        (-gamma * dist).exp()
    }

    fn scale_gamma(x: &Array2<f64>) -> f64 {
        let var = x.var(0.0);
        if var > 0.0 && var.is_finite() {
            1.0 / (x.ncols() as f64 * var)
        } else {
            1.0
        }
    }

    fn soft_threshold(x: f64, lambda: f64) -> f64 {
        if x > lambda {
            x - lambda
        } else if x < -lambda {
            x + lambda
        } else {
            0.0
        }
    }
}

impl Regressor for SupportVectorRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
        if !(self.c > 0.0) || self.epsilon < 0.0 {
            return Err(ModelError::InvalidParameter(format!(
                "SVR needs C > 0 and epsilon >= 0, got C={} epsilon={}",
                self.c, self.epsilon
            )));
        }
        let n = x.nrows();
        let gamma = self.gamma.unwrap_or_else(|| Self::scale_gamma(x));

        // Kernel with the bias folded in
        let mut kernel = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in 0..=i {
                let k = Self::rbf(gamma, x.row(i), x.row(j)) + 1.0;
                kernel[[i, j]] = k;
                kernel[[j, i]] = k;
            }
        }

        let mut beta = Array1::<f64>::zeros(n);
        // f = K beta, kept in sync with every coordinate update
        let mut f = Array1::<f64>::zeros(n);
        let mut converged = false;

        for sweep in 0..MAX_SWEEPS {
            let mut max_delta: f64 = 0.0;
            for i in 0..n {
                let k_ii = kernel[[i, i]];
                let others = f[i] - k_ii * beta[i];
                let target = Self::soft_threshold(y[i] - others, self.epsilon) / k_ii;
                let updated = target.clamp(-self.c, self.c);
                let delta = updated - beta[i];
                if delta != 0.0 {
                    f.scaled_add(delta, &kernel.index_axis(Axis(1), i));
                    beta[i] = updated;
                    max_delta = max_delta.max(delta.abs());
                }
            }
            if max_delta < TOLERANCE {
                converged = true;
                debug!("SVR converged after {} sweeps", sweep + 1);
                break;
            }
        }
        if !converged {
            warn!("SVR did not converge after {} sweeps", MAX_SWEEPS);
        }
        ensure_finite(beta.iter())?;

        let support: Vec<usize> = (0..n).filter(|&i| beta[i] != 0.0).collect();
        self.support_vectors = Some(x.select(Axis(0), &support));
        self.dual_coef = beta.select(Axis(0), &support);
        self.fitted_gamma = gamma;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let support = self.support_vectors.as_ref().ok_or(ModelError::NotFitted)?;
        check_features(support.ncols(), x)?;

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                support
                    .rows()
                    .into_iter()
                    .zip(self.dual_coef.iter())
                    .map(|(sv, coef)| coef * (Self::rbf(self.fitted_gamma, sv, row) + 1.0))
                    .sum::<f64>()
            })
            .collect())
    }

    fn is_fitted(&self) -> bool {
        self.support_vectors.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_smooth_function_within_epsilon() {
        let x = Array2::from_shape_fn((60, 1), |(i, _)| i as f64 / 10.0);
        let y = x.column(0).mapv(|v| v.sin());

        let mut model = SupportVectorRegressor::new(10.0, 0.05);
        model.fit(&x, &y).unwrap();
        let predictions = model.predict(&x).unwrap();

        let max_err = predictions
            .iter()
            .zip(y.iter())
            .map(|(p, t)| (p - t).abs())
            .fold(0.0f64, f64::max);
        assert!(max_err < 0.25, "max error {}", max_err);
        assert!(model.n_support() > 0);
    }

    #[test]
    fn test_coefficients_bounded_by_c() {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| (i * (j + 1)) as f64);
        let y = Array1::from_shape_fn(30, |i| 1000.0 + i as f64);
        let mut model = SupportVectorRegressor::new(1.0, 0.1);
        model.fit(&x, &y).unwrap();
        assert!(model.dual_coef.iter().all(|b| b.abs() <= 1.0 + 1e-12));
    }

    #[test]
    fn test_gamma_scale() {
        let x = Array2::from_shape_vec((2, 2), vec![0.0, 0.0, 2.0, 2.0]).unwrap();
        // Var over all entries is 1, two features
        assert!((SupportVectorRegressor::scale_gamma(&x) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_c() {
        let mut model = SupportVectorRegressor::new(0.0, 0.1);
        let x = Array2::zeros((2, 1));
        assert!(model.fit(&x, &Array1::zeros(2)).is_err());
    }
}
