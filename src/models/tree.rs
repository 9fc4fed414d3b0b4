//! CART regression tree with squared-error splits.

use super::check_features;
use crate::error::ModelError;
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    pub fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    /// Sum of squared errors removed by the split
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// CART regression tree, the base learner for gradient boosting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    config: TreeConfig,
    root: Option<TreeNode>,
    n_features: usize,
    /// Raw impurity decrease per feature, not normalized
    impurity_decrease: Vec<f64>,
}

impl RegressionTree {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            root: None,
            n_features: 0,
            impurity_decrease: Vec::new(),
        }
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    /// Features are visited in a fresh random order at every node, so ties
    /// between equally good splits are broken by `rng`.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, rng: &mut ChaCha8Rng) -> Result<(), ModelError> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(ModelError::EmptyInput);
        }
        self.n_features = x.ncols();
        self.impurity_decrease = vec![0.0; x.ncols()];
        let root = self.build(x, y, (0..x.nrows()).collect(), 0, rng);
        self.root = Some(root);
        Ok(())
    }

    fn build(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: Vec<usize>,
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n = indices.len();
        let sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let mean = sum / n as f64;
        let sse: f64 = indices.iter().map(|&i| (y[i] - mean).powi(2)).sum();

        let leaf = TreeNode::Leaf {
            value: mean,
            n_samples: n,
        };
        if depth >= self.config.max_depth
            || n < self.config.min_samples_split
            || n < 2 * self.config.min_samples_leaf
            || sse <= 1e-12 * (1.0 + mean * mean)
        {
            return leaf;
        }

        let Some(split) = self.best_split(x, y, &indices, rng) else {
            return leaf;
        };

        self.impurity_decrease[split.feature] += split.gain;
        let left = self.build(x, y, split.left, depth + 1, rng);
        let right = self.build(x, y, split.right, depth + 1, rng);
        TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf.max(1);
        // Sums are taken on node-centered targets to keep the gains precise
        let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / n as f64;
        let total_sum: f64 = indices.iter().map(|&i| y[i] - mean).sum();
        let parent_score = total_sum * total_sum / n as f64;

        let mut features: Vec<usize> = (0..x.ncols()).collect();
        features.shuffle(rng);

        let mut best: Option<(usize, f64, f64)> = None;
        let mut sorted = indices.to_vec();

        for &feature in &features {
            sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

            // Minimizing child SSE is maximizing sum_l^2/n_l + sum_r^2/n_r
            let mut left_sum = 0.0;
            for pos in 0..n - 1 {
                left_sum += y[sorted[pos]] - mean;
                let n_left = pos + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let here = x[[sorted[pos], feature]];
                let next = x[[sorted[pos + 1], feature]];
                if next <= here {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let score = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
                let gain = score - parent_score;
                if gain > 0.0 && best.is_none_or(|(_, _, g)| gain > g) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some((feature, threshold, gain));
                }
            }
        }

        let (feature, threshold, gain) = best?;
        let (left, right): (Vec<usize>, Vec<usize>) =
            indices.iter().copied().partition(|&i| x[[i, feature]] <= threshold);
        Some(BestSplit {
            feature,
            threshold,
            gain,
            left,
            right,
        })
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let root = self.root.as_ref().ok_or(ModelError::NotFitted)?;
        check_features(self.n_features, x)?;
        Ok(x.rows().into_iter().map(|row| root.predict_row(row)).collect())
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    /// Impurity decrease per feature, normalized to sum to 1.
    pub fn feature_importances(&self) -> Vec<f64> {
        normalize(&self.impurity_decrease)
    }
}

/// Scale scores to sum to 1; all-zero scores stay zero.
pub fn normalize(scores: &[f64]) -> Vec<f64> {
    let total: f64 = scores.iter().sum();
    if total > 0.0 {
        scores.iter().map(|s| s / total).collect()
    } else {
        scores.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 2) as f64 });
        let y = Array1::from_shape_fn(20, |i| if i < 10 { 1.0 } else { 5.0 });
        (x, y)
    }

    #[test]
    fn test_single_split_on_step() {
        let (x, y) = step_data();
        let mut tree = RegressionTree::new(TreeConfig::default());
        tree.fit(&x, &y, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();

        match tree.root().unwrap() {
            TreeNode::Split { feature, threshold, .. } => {
                assert_eq!(*feature, 0);
                assert_eq!(*threshold, 9.5);
            }
            TreeNode::Leaf { .. } => panic!("expected a split"),
        }
        assert_eq!(tree.root().unwrap().n_leaves(), 2);
        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.feature_importances(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_max_depth_respected() {
        let x = Array2::from_shape_fn((64, 1), |(i, _)| i as f64);
        let y = x.column(0).mapv(|v| v * v);
        let config = TreeConfig {
            max_depth: 3,
            ..TreeConfig::default()
        };
        let mut tree = RegressionTree::new(config);
        tree.fit(&x, &y, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        assert!(tree.root().unwrap().depth() <= 3);
    }

    #[test]
    fn test_constant_target_is_leaf() {
        let x = Array2::from_shape_fn((5, 1), |(i, _)| i as f64);
        let y = Array1::from_elem(5, 3.0);
        let mut tree = RegressionTree::new(TreeConfig::default());
        tree.fit(&x, &y, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        assert!(matches!(tree.root(), Some(TreeNode::Leaf { n_samples: 5, .. })));
        assert_eq!(tree.feature_importances(), vec![0.0]);
    }

    #[test]
    fn test_unfitted_predict() {
        let tree = RegressionTree::new(TreeConfig::default());
        assert_eq!(tree.predict(&Array2::zeros((1, 1))), Err(ModelError::NotFitted));
    }
}
