//! Multi-layer perceptron regressor trained with Adam on mini-batches.

use super::{Regressor, check_features, ensure_finite};
use crate::error::ModelError;
use log::{debug, warn};
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand::distributions::{Distribution, Uniform};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const L2_PENALTY: f64 = 1e-4;
const MAX_BATCH: usize = 200;
const TOLERANCE: f64 = 1e-4;
const PATIENCE: usize = 10;
const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    ReLU,
    Identity,
}

impl Activation {
    fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| v.max(0.0)),
            Activation::Identity => z.clone(),
        }
    }

    /// Derivative evaluated at the pre-activation `z`
    fn derivative(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Identity => Array2::ones(z.raw_dim()),
        }
    }
}

/// Fully connected layer, `weights` shaped (input x output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
    pub activation: Activation,
}

impl DenseLayer {
    /// Glorot uniform initialization
    fn new(input_dim: usize, output_dim: usize, activation: Activation, rng: &mut ChaCha8Rng) -> Self {
        let bound = (6.0 / (input_dim + output_dim) as f64).sqrt();
        let dist = Uniform::new(-bound, bound);
        let weights = Array2::from_shape_fn((input_dim, output_dim), |_| dist.sample(rng));
        let bias = Array1::from_shape_fn(output_dim, |_| dist.sample(rng));
        Self {
            weights,
            bias,
            activation,
        }
    }

    fn pre_activation(&self, input: &Array2<f64>) -> Array2<f64> {
        input.dot(&self.weights) + &self.bias
    }
}

/// First and second moment estimates for one layer
#[derive(Debug, Clone)]
struct AdamState {
    m_w: Array2<f64>,
    v_w: Array2<f64>,
    m_b: Array1<f64>,
    v_b: Array1<f64>,
}

impl AdamState {
    fn for_layer(layer: &DenseLayer) -> Self {
        Self {
            m_w: Array2::zeros(layer.weights.raw_dim()),
            v_w: Array2::zeros(layer.weights.raw_dim()),
            m_b: Array1::zeros(layer.bias.raw_dim()),
            v_b: Array1::zeros(layer.bias.raw_dim()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpRegressor {
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub seed: u64,
    layers: Vec<DenseLayer>,
    loss_curve: Vec<f64>,
}

impl MlpRegressor {
    pub fn new(hidden_layers: Vec<usize>, learning_rate: f64, max_epochs: usize, seed: u64) -> Self {
        Self {
            hidden_layers,
            learning_rate,
            max_epochs,
            seed,
            layers: Vec::new(),
            loss_curve: Vec::new(),
        }
    }

    /// Mean training loss per epoch
    pub fn loss_curve(&self) -> &[f64] {
        &self.loss_curve
    }

    fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        self.layers.iter().fold(x.clone(), |input, layer| {
            layer.activation.apply(&layer.pre_activation(&input))
        })
    }

    /// One Adam step on a mini-batch; returns the batch loss.
    fn train_batch(&mut self, x: &Array2<f64>, y: &Array1<f64>, state: &mut [AdamState], step: i32) -> f64 {
        let batch = x.nrows() as f64;

        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        let mut activation = x.clone();
        for layer in &self.layers {
            let z = layer.pre_activation(&activation);
            inputs.push(activation);
            activation = layer.activation.apply(&z);
            pre_activations.push(z);
        }

        let prediction = activation.column(0).to_owned();
        let error = &prediction - y;
        let penalty: f64 = self
            .layers
            .iter()
            .map(|l| l.weights.mapv(|w| w * w).sum())
            .sum();
        let loss = 0.5 * error.mapv(|e| e * e).mean().unwrap_or(0.0) + 0.5 * L2_PENALTY * penalty / batch;

        let mut delta = error.insert_axis(Axis(1)) / batch;
        let correction1 = 1.0 - BETA1.powi(step);
        let correction2 = 1.0 - BETA2.powi(step);
        let lr = self.learning_rate * correction2.sqrt() / correction1;

        for idx in (0..self.layers.len()).rev() {
            let grad_w = inputs[idx].t().dot(&delta) + &(&self.layers[idx].weights * (L2_PENALTY / batch));
            let grad_b = delta.sum_axis(Axis(0));

            if idx > 0 {
                let back = delta.dot(&self.layers[idx].weights.t());
                delta = back * self.layers[idx - 1].activation.derivative(&pre_activations[idx - 1]);
            }

            let s = &mut state[idx];
            s.m_w = &s.m_w * BETA1 + &(&grad_w * (1.0 - BETA1));
            s.v_w = &s.v_w * BETA2 + &(grad_w.mapv(|g| g * g) * (1.0 - BETA2));
            s.m_b = &s.m_b * BETA1 + &(&grad_b * (1.0 - BETA1));
            s.v_b = &s.v_b * BETA2 + &(grad_b.mapv(|g| g * g) * (1.0 - BETA2));

            let layer = &mut self.layers[idx];
            layer.weights -= &(&s.m_w / &s.v_w.mapv(|v| v.sqrt() + ADAM_EPSILON) * lr);
            layer.bias -= &(&s.m_b / &s.v_b.mapv(|v| v.sqrt() + ADAM_EPSILON) * lr);
        }

        loss
    }
}

impl Regressor for MlpRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
        if self.hidden_layers.contains(&0) || !(self.learning_rate > 0.0) {
            return Err(ModelError::InvalidParameter(format!(
                "hidden layers {:?}, learning rate {}",
                self.hidden_layers, self.learning_rate
            )));
        }
        let n = x.nrows();
        if n == 0 {
            return Err(ModelError::EmptyInput);
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let mut dims = vec![x.ncols()];
        dims.extend(&self.hidden_layers);
        dims.push(1);
        self.layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let activation = if i + 2 == dims.len() {
                    Activation::Identity
                } else {
                    Activation::ReLU
                };
                DenseLayer::new(pair[0], pair[1], activation, &mut rng)
            })
            .collect();

        let mut state: Vec<AdamState> = self.layers.iter().map(AdamState::for_layer).collect();
        let batch_size = MAX_BATCH.min(n);
        let mut order: Vec<usize> = (0..n).collect();
        let mut best_loss = f64::INFINITY;
        let mut stale_epochs = 0;
        let mut step = 0;
        self.loss_curve.clear();

        for epoch in 0..self.max_epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            for chunk in order.chunks(batch_size) {
                step += 1;
                let xb = x.select(Axis(0), chunk);
                let yb = y.select(Axis(0), chunk);
                epoch_loss += self.train_batch(&xb, &yb, &mut state, step) * chunk.len() as f64;
            }
            epoch_loss /= n as f64;
            if !epoch_loss.is_finite() {
                return Err(ModelError::NonFinite);
            }
            self.loss_curve.push(epoch_loss);

            if epoch_loss > best_loss - TOLERANCE {
                stale_epochs += 1;
            } else {
                stale_epochs = 0;
            }
            best_loss = best_loss.min(epoch_loss);
            if stale_epochs > PATIENCE {
                debug!("MLP stopped after {} epochs, loss {:.6}", epoch + 1, epoch_loss);
                break;
            }
        }
        if stale_epochs <= PATIENCE {
            warn!(
                "MLP reached {} epochs without converging, loss {:.6}",
                self.max_epochs, best_loss
            );
        }

        ensure_finite(
            self.layers
                .iter()
                .flat_map(|l| l.weights.iter().chain(l.bias.iter())),
        )
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let first = self.layers.first().ok_or(ModelError::NotFitted)?;
        check_features(first.weights.nrows(), x)?;
        Ok(self.forward(x).column(0).to_owned())
    }

    fn is_fitted(&self) -> bool {
        !self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((100, 2), |(i, j)| {
            let t = i as f64 / 50.0 - 1.0;
            if j == 0 { t } else { (i as f64 * 0.37).sin() }
        });
        let y = x.column(0).mapv(|v| 3.0 * v) + &x.column(1).mapv(|v| 0.5 * v);
        (x, y)
    }

    #[test]
    fn test_mlp_learns_linear_map() {
        let (x, y) = linear_data();
        let mut model = MlpRegressor::new(vec![16], 0.01, 1000, 42);
        model.fit(&x, &y).unwrap();

        let predictions = model.predict(&x).unwrap();
        let mse = (&predictions - &y).mapv(|d| d * d).mean().unwrap();
        assert!(mse < 0.1, "mse {}", mse);
    }

    #[test]
    fn test_loss_decreases() {
        let (x, y) = linear_data();
        let mut model = MlpRegressor::new(vec![8, 4], 0.001, 50, 1);
        model.fit(&x, &y).unwrap();

        let curve = model.loss_curve();
        assert!(curve.last().unwrap() < curve.first().unwrap());
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let (x, y) = linear_data();
        let mut a = MlpRegressor::new(vec![8], 0.001, 20, 9);
        let mut b = MlpRegressor::new(vec![8], 0.001, 20, 9);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_predict_requires_fit() {
        let model = MlpRegressor::new(vec![8], 0.001, 20, 9);
        assert_eq!(model.predict(&Array2::zeros((1, 2))), Err(ModelError::NotFitted));
    }
}
