//! Gradient boosting on squared loss: each stage fits a tree to the current
//! residuals and adds a shrunken copy of it to the ensemble.

use super::tree::{RegressionTree, TreeConfig, normalize};
use super::{FeatureImportance, Regressor, check_features};
use crate::error::ModelError;
use log::debug;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    pub n_stages: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub seed: u64,
    init: Option<f64>,
    n_features: usize,
    stages: Vec<RegressionTree>,
    feature_importances: Vec<f64>,
}

impl GradientBoosting {
    pub fn new(n_stages: usize, learning_rate: f64, max_depth: usize, seed: u64) -> Self {
        Self {
            n_stages,
            learning_rate,
            max_depth,
            seed,
            init: None,
            n_features: 0,
            stages: Vec::new(),
            feature_importances: Vec::new(),
        }
    }

    pub fn n_stages_fitted(&self) -> usize {
        self.stages.len()
    }
}

impl Regressor for GradientBoosting {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
        if !(self.learning_rate > 0.0) {
            return Err(ModelError::InvalidParameter(format!(
                "learning rate {}",
                self.learning_rate
            )));
        }
        let init = y.mean().ok_or(ModelError::EmptyInput)?;
        let config = TreeConfig {
            max_depth: self.max_depth,
            ..TreeConfig::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut current = Array1::from_elem(y.len(), init);
        let mut stages = Vec::with_capacity(self.n_stages);
        let mut importances = vec![0.0; x.ncols()];

        for _ in 0..self.n_stages {
            let residual = y - &current;
            let mut tree = RegressionTree::new(config.clone());
            tree.fit(x, &residual, &mut rng)?;

            current.scaled_add(self.learning_rate, &tree.predict(x)?);
            for (total, imp) in importances.iter_mut().zip(tree.feature_importances()) {
                *total += imp;
            }
            stages.push(tree);
        }

        self.init = Some(init);
        self.n_features = x.ncols();
        self.stages = stages;
        self.feature_importances = normalize(&importances);
        debug!("Gradient boosting fitted with {} stages", self.stages.len());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let init = self.init.ok_or(ModelError::NotFitted)?;
        check_features(self.n_features, x)?;
        let mut prediction = Array1::from_elem(x.nrows(), init);
        for tree in &self.stages {
            prediction.scaled_add(self.learning_rate, &tree.predict(x)?);
        }
        Ok(prediction)
    }

    fn is_fitted(&self) -> bool {
        self.init.is_some()
    }
}

impl FeatureImportance for GradientBoosting {
    fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}
