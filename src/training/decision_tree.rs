//! Decision tree implementation

use super::{argmax, check_shapes, Estimator};
use crate::error::{BuilderError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf {
        value: f64,
        /// Class fractions indexed by class code; empty for regression
        distribution: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Mean squared error (regression)
    MSE,
}

/// Running statistics for one side of a candidate split
#[derive(Clone)]
struct SideStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
    class_counts: Vec<usize>,
}

impl SideStats {
    fn empty(n_classes: usize) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sq_sum: 0.0,
            class_counts: vec![0; n_classes],
        }
    }

    fn add(&mut self, yi: f64, classification: bool) {
        self.count += 1;
        if classification {
            self.class_counts[yi as usize] += 1;
        } else {
            self.sum += yi;
            self.sq_sum += yi * yi;
        }
    }

    fn remove(&mut self, yi: f64, classification: bool) {
        self.count -= 1;
        if classification {
            self.class_counts[yi as usize] -= 1;
        } else {
            self.sum -= yi;
            self.sq_sum -= yi * yi;
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        match criterion {
            Criterion::Gini => 1.0 - self.class_counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>(),
            Criterion::MSE => (self.sq_sum / n - (self.sum / n).powi(2)).max(0.0),
        }
    }
}

/// CART decision tree for classification or regression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features sampled at each split; `None` considers all of them
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    pub random_state: u64,
    n_features: usize,
    is_classification: bool,
    n_classes: usize,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: 42,
            n_features: 0,
            is_classification: true,
            n_classes: 0,
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier()
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fix the width of the class distribution.
    ///
    /// Trees trained on a bootstrap sample may not see every class.
    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = n_classes;
        self
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.is_some_and(|d| depth >= d)
            || self.is_pure(y, indices);

        if should_stop {
            return self.make_leaf(y, indices);
        }

        let features = self.candidate_features(rng);
        match self.find_best_split(x, y, indices, &features) {
            Some((feature_idx, threshold)) => {
                let (left_indices, right_indices): (Vec<usize>, Vec<usize>) =
                    indices.iter().partition(|&&i| x[[i, feature_idx]] <= threshold);

                let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, rng));
                let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, rng));

                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    n_samples,
                }
            }
            None => self.make_leaf(y, indices),
        }
    }

    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < self.n_features => {
                let mut chosen = rand::seq::index::sample(rng, self.n_features, k).into_vec();
                chosen.sort_unstable();
                chosen
            }
            _ => (0..self.n_features).collect(),
        }
    }

    /// Best (feature, threshold) by impurity decrease, scanning each feature
    /// once over its sorted values. Earlier features win ties.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        features: &[usize],
    ) -> Option<(usize, f64)> {
        let classification = self.is_classification;
        let mut parent = SideStats::empty(self.n_classes);
        for &i in indices {
            parent.add(y[i], classification);
        }
        let parent_impurity = parent.impurity(self.criterion);
        let n = indices.len() as f64;

        let feature_results: Vec<Option<(usize, f64, f64)>> = features
            .par_iter()
            .map(|&feature_idx| {
                let mut sorted: Vec<usize> = indices.to_vec();
                sorted.sort_by(|&a, &b| x[[a, feature_idx]].total_cmp(&x[[b, feature_idx]]));

                let mut left = SideStats::empty(self.n_classes);
                let mut right = parent.clone();
                let mut best: Option<(f64, f64)> = None;

                for pos in 0..sorted.len() - 1 {
                    let yi = y[sorted[pos]];
                    left.add(yi, classification);
                    right.remove(yi, classification);

                    let current = x[[sorted[pos], feature_idx]];
                    let next = x[[sorted[pos + 1], feature_idx]];
                    if current >= next {
                        continue;
                    }
                    if left.count < self.min_samples_leaf || right.count < self.min_samples_leaf {
                        continue;
                    }

                    let weighted = (left.count as f64 * left.impurity(self.criterion)
                        + right.count as f64 * right.impurity(self.criterion))
                        / n;
                    let gain = parent_impurity - weighted;
                    if gain > best.map_or(1e-12, |(g, _)| g) {
                        best = Some((gain, (current + next) / 2.0));
                    }
                }

                best.map(|(gain, threshold)| (feature_idx, threshold, gain))
            })
            .collect();

        feature_results
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<(usize, f64, f64)>, cand| match acc {
                Some(a) if a.2 >= cand.2 => Some(a),
                _ => Some(cand),
            })
            .map(|(feature_idx, threshold, _)| (feature_idx, threshold))
    }

    fn is_pure(&self, y: &Array1<f64>, indices: &[usize]) -> bool {
        let first = y[indices[0]];
        indices.iter().all(|&i| (y[i] - first).abs() < 1e-10)
    }

    fn make_leaf(&self, y: &Array1<f64>, indices: &[usize]) -> TreeNode {
        let n_samples = indices.len();
        if self.is_classification {
            let mut counts = vec![0usize; self.n_classes];
            for &i in indices {
                counts[y[i] as usize] += 1;
            }
            let distribution: Vec<f64> = counts.iter().map(|&c| c as f64 / n_samples as f64).collect();
            // Lowest class code wins ties
            let value = argmax(counts.iter().map(|&c| c as f64)) as f64;
            TreeNode::Leaf {
                value,
                distribution,
                n_samples,
            }
        } else {
            let value = indices.iter().map(|&i| y[i]).sum::<f64>() / n_samples as f64;
            TreeNode::Leaf {
                value,
                distribution: Vec::new(),
                n_samples,
            }
        }
    }

    /// Value and class distribution of the leaf reached by `sample`
    fn leaf_for<'a>(&self, node: &'a TreeNode, sample: ArrayView1<f64>) -> (f64, &'a [f64]) {
        match node {
            TreeNode::Leaf {
                value, distribution, ..
            } => (*value, distribution),
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                ..
            } => {
                if sample[*feature_idx] <= *threshold {
                    self.leaf_for(left, sample)
                } else {
                    self.leaf_for(right, sample)
                }
            }
        }
    }

    fn root_checked(&self, x: &Array2<f64>) -> Result<&TreeNode> {
        let root = self.root.as_ref().ok_or(BuilderError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(BuilderError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(root)
    }

    /// Width of the probability output
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    pub fn get_n_leaves(&self) -> usize {
        fn leaves(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => leaves(left) + leaves(right),
            }
        }
        self.root.as_ref().map_or(0, leaves)
    }
}

impl Estimator for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        if self.is_classification {
            if y.iter().any(|&v| v < 0.0 || v.fract() != 0.0) {
                return Err(BuilderError::Training(
                    "Classification targets must be non-negative class codes".to_string(),
                ));
            }
            let max_code = y.iter().cloned().fold(0.0f64, f64::max) as usize;
            self.n_classes = self.n_classes.max(max_code + 1);
        }
        self.n_features = x.ncols();

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(self.build_tree(x, y, &indices, 0, &mut rng));
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root_checked(x)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| self.leaf_for(root, row).0)
            .collect())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        if !self.is_classification {
            return Ok(None);
        }
        let root = self.root_checked(x)?;
        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            let (_, distribution) = self.leaf_for(root, row);
            for (c, &p) in distribution.iter().enumerate() {
                proba[[i, c]] = p;
            }
        }
        Ok(Some(proba))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_separable() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.get_n_leaves(), 2);
    }

    #[test]
    fn test_regressor_fits_training_data() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();

        let predictions = tree.predict(&x).unwrap();
        let mse: f64 = predictions
            .iter()
            .zip(y.iter())
            .map(|(p, a)| (p - a).powi(2))
            .sum::<f64>()
            / y.len() as f64;
        assert!(mse < 1e-12, "MSE too high: {}", mse);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0], [5.0, 1.0], [6.0, 0.0]];
        let y = array![0.0, 1.0, 0.0, 1.0, 0.0, 1.0];

        let mut tree = DecisionTree::new_classifier().with_max_depth(2);
        tree.fit(&x, &y).unwrap();
        assert!(tree.get_depth() <= 2);
    }

    #[test]
    fn test_leaf_probabilities() {
        let x = array![[0.0], [0.0], [0.0], [1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier().with_max_depth(1);
        tree.fit(&x, &y).unwrap();
        let proba = tree.predict_proba(&array![[0.0], [1.0]]).unwrap().unwrap();
        assert!((proba[[0, 0]] - 2.0 / 3.0).abs() < 1e-12);
        assert!((proba[[1, 1]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_tied_leaf_picks_lowest_class() {
        let x = array![[1.0], [1.0]];
        let y = array![1.0, 0.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&x).unwrap(), array![0.0, 0.0]);
    }

    #[test]
    fn test_regressor_has_no_probabilities() {
        let mut tree = DecisionTree::new_regressor();
        tree.fit(&array![[1.0], [2.0]], &array![1.0, 2.0]).unwrap();
        assert!(tree.predict_proba(&array![[1.0]]).unwrap().is_none());
    }
}
