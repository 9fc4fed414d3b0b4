//! Random forest regressor on smartcore.
//!
//! smartcore's forest keeps no impurity statistics, so importances are
//! permutation importances on the training rows: the rise in squared error
//! when one column is shuffled, normalized to sum to 1.

use super::tree::normalize;
use super::{FeatureImportance, Regressor, backend, check_features, ensure_finite, to_dense};
use crate::error::ModelError;
use crate::metrics::mean_squared_error;
use log::debug;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

fn hyper_parameter<T: TryFrom<usize>>(value: usize, name: &str) -> Result<T, ModelError> {
    T::try_from(value)
        .map_err(|_| ModelError::InvalidParameter(format!("{} out of range: {}", name, value)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_trees: usize,
    pub max_depth: usize,
    pub seed: u64,
    n_features: usize,
    model: Option<Forest>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(n_trees: usize, max_depth: usize, seed: u64) -> Self {
        Self {
            n_trees,
            max_depth,
            seed,
            n_features: 0,
            model: None,
            feature_importances: Vec::new(),
        }
    }

    fn predict_with(model: &Forest, x: &Array2<f64>) -> Result<Vec<f64>, ModelError> {
        model.predict(&to_dense(x)?).map_err(backend)
    }

    /// Column `j` of `x` shuffled with a generator seeded from `seed + j`
    fn permuted(&self, x: &Array2<f64>, column: usize) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(column as u64));
        let mut order: Vec<usize> = (0..x.nrows()).collect();
        order.shuffle(&mut rng);

        let mut shuffled = x.clone();
        for (row, &source) in order.iter().enumerate() {
            shuffled[[row, column]] = x[[source, column]];
        }
        shuffled
    }

    fn permutation_importances(
        &self,
        model: &Forest,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<Vec<f64>, ModelError> {
        let truth = y.to_vec();
        let baseline = mean_squared_error(&truth, &Self::predict_with(model, x)?);

        // collect keeps column order, so the result is independent of scheduling
        let increases = (0..x.ncols())
            .into_par_iter()
            .map(|column| {
                let predictions = Self::predict_with(model, &self.permuted(x, column))?;
                Ok((mean_squared_error(&truth, &predictions) - baseline).max(0.0))
            })
            .collect::<Result<Vec<f64>, ModelError>>()?;
        Ok(normalize(&increases))
    }
}

impl Regressor for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
        if self.n_trees == 0 {
            return Err(ModelError::InvalidParameter("forest needs at least one tree".into()));
        }
        let params = RandomForestRegressorParameters::default()
            .with_n_trees(hyper_parameter(self.n_trees, "n_trees")?)
            .with_max_depth(hyper_parameter(self.max_depth, "max_depth")?)
            .with_min_samples_split(2)
            .with_min_samples_leaf(1)
            .with_m(x.ncols())
            .with_seed(self.seed);

        let model = Forest::fit(&to_dense(x)?, &y.to_vec(), params).map_err(backend)?;
        self.feature_importances = self.permutation_importances(&model, x, y)?;
        ensure_finite(self.feature_importances.iter())?;
        self.n_features = x.ncols();
        self.model = Some(model);

        debug!("Random forest fitted with {} trees", self.n_trees);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let model = self.model.as_ref().ok_or(ModelError::NotFitted)?;
        check_features(self.n_features, x)?;
        Ok(Array1::from(Self::predict_with(model, x)?))
    }

    fn is_fitted(&self) -> bool {
        self.model.is_some()
    }
}

impl FeatureImportance for RandomForest {
    fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((120, 3), |(i, j)| match j {
            0 => (i as f64 * 0.2).sin(),
            1 => ((i * 13) % 7) as f64,
            _ => i as f64 / 120.0,
        });
        let y = x.column(0).mapv(|v| 10.0 * v);
        (x, y)
    }

    #[test]
    fn test_forest_fits_signal() {
        let (x, y) = wave();
        let mut forest = RandomForest::new(20, 8, 42);
        forest.fit(&x, &y).unwrap();

        let predictions = forest.predict(&x).unwrap();
        let mse = mean_squared_error(&y.to_vec(), &predictions.to_vec());
        assert!(mse < 1.0, "mse {}", mse);
    }

    #[test]
    fn test_importances_sum_to_one_and_favor_signal() {
        let (x, y) = wave();
        let mut forest = RandomForest::new(20, 8, 42);
        forest.fit(&x, &y).unwrap();

        let importances = forest.feature_importances();
        assert_eq!(importances.len(), 3);
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
        assert!(importances.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let (x, y) = wave();
        let mut a = RandomForest::new(10, 6, 7);
        let mut b = RandomForest::new(10, 6, 7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
        assert_eq!(a.feature_importances(), b.feature_importances());
    }

    #[test]
    fn test_unfitted() {
        let forest = RandomForest::new(10, 6, 7);
        assert!(!forest.is_fitted());
        assert_eq!(forest.predict(&Array2::zeros((1, 3))), Err(ModelError::NotFitted));
    }

    #[test]
    fn test_depth_out_of_range_rejected() {
        let (x, y) = wave();
        let mut forest = RandomForest::new(5, usize::MAX, 7);
        assert!(matches!(forest.fit(&x, &y), Err(ModelError::InvalidParameter(_))));
    }
}
