//! Gradient Boosting implementation
//!
//! Boosted regression trees fit to the negative gradient of the loss:
//! squared error for regression, log loss for binary classification and
//! softmax cross-entropy (one tree per class per round) for multiclass.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::decision_tree::DecisionTree;
use super::{argmax, check_shapes, Estimator};
use crate::error::{BuilderError, Result};

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Row subsample ratio for each round
    pub subsample: f64,
    /// Column subsample ratio for each round
    pub colsample_bytree: f64,
    pub random_state: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 5,
            min_samples_leaf: 1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: 42,
        }
    }
}

impl GradientBoostingConfig {
    fn sample_indices(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        if ratio >= 1.0 {
            return indices;
        }
        let sample_size = ((n as f64) * ratio).ceil().max(1.0) as usize;
        indices.shuffle(rng);
        indices.truncate(sample_size);
        indices.sort_unstable();
        indices
    }

    /// Fit one regression tree to `targets` on a row/column subsample.
    /// Returns the tree and its column indices.
    fn fit_stage_tree(
        &self,
        x_rows: &Array2<f64>,
        targets: &Array1<f64>,
        rows: &[usize],
        cols: &[usize],
        rng: &mut Xoshiro256PlusPlus,
    ) -> Result<DecisionTree> {
        let x_sub = x_rows.select(Axis(1), cols);
        let y_sub: Array1<f64> = rows.iter().map(|&i| targets[i]).collect();
        let mut tree = DecisionTree::new_regressor()
            .with_max_depth(self.max_depth)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_random_state(rng.gen());
        tree.fit(&x_sub, &y_sub)?;
        Ok(tree)
    }
}

/// Gradient Boosting Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    config: GradientBoostingConfig,
    trees: Vec<DecisionTree>,
    col_indices_per_tree: Vec<Vec<usize>>,
    initial_prediction: f64,
}

impl Default for GradientBoostingRegressor {
    fn default() -> Self {
        Self::new(GradientBoostingConfig::default())
    }
}

impl GradientBoostingRegressor {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            col_indices_per_tree: Vec::new(),
            initial_prediction: 0.0,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Estimator for GradientBoostingRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();

        self.initial_prediction = y.mean().unwrap_or(0.0);
        self.trees.clear();
        self.col_indices_per_tree.clear();

        let mut predictions = Array1::from_elem(n_samples, self.initial_prediction);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);

        for _ in 0..self.config.n_estimators {
            let residuals = y - &predictions;

            let rows = GradientBoostingConfig::sample_indices(n_samples, self.config.subsample, &mut rng);
            let cols = GradientBoostingConfig::sample_indices(n_features, self.config.colsample_bytree, &mut rng);
            let x_rows = x.select(Axis(0), &rows);
            let tree = self.config.fit_stage_tree(&x_rows, &residuals, &rows, &cols, &mut rng)?;

            // Every row moves, not just the sampled ones
            let update = tree.predict(&x.select(Axis(1), &cols))?;
            predictions.scaled_add(self.config.learning_rate, &update);

            self.trees.push(tree);
            self.col_indices_per_tree.push(cols);
        }

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(BuilderError::ModelNotFitted);
        }
        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);
        for (tree, cols) in self.trees.iter().zip(&self.col_indices_per_tree) {
            let update = tree.predict(&x.select(Axis(1), cols))?;
            predictions.scaled_add(self.config.learning_rate, &update);
        }
        Ok(predictions)
    }
}

/// Gradient Boosting Classifier
///
/// Binary problems keep a single log-odds score; multiclass problems keep
/// one score per class and normalise with softmax.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    /// One entry per round: a tree per score column
    stages: Vec<Vec<DecisionTree>>,
    col_indices_per_stage: Vec<Vec<usize>>,
    initial_scores: Vec<f64>,
    n_classes: usize,
}

impl Default for GradientBoostingClassifier {
    fn default() -> Self {
        Self::new(GradientBoostingConfig::default())
    }
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            stages: Vec::new(),
            col_indices_per_stage: Vec::new(),
            initial_scores: Vec::new(),
            n_classes: 0,
        }
    }

    fn n_outputs(&self) -> usize {
        if self.n_classes == 2 {
            1
        } else {
            self.n_classes
        }
    }

    fn sigmoid(z: f64) -> f64 {
        1.0 / (1.0 + (-z).exp())
    }

    /// Class probabilities from raw scores, one row per sample
    fn scores_to_proba(&self, scores: &Array2<f64>) -> Array2<f64> {
        let n = scores.nrows();
        let mut proba = Array2::zeros((n, self.n_classes));
        if self.n_classes == 2 {
            for i in 0..n {
                let p = Self::sigmoid(scores[[i, 0]]);
                proba[[i, 0]] = 1.0 - p;
                proba[[i, 1]] = p;
            }
        } else {
            for (i, row) in scores.rows().into_iter().enumerate() {
                let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let exps: Vec<f64> = row.iter().map(|&s| (s - max).exp()).collect();
                let sum: f64 = exps.iter().sum();
                for (c, e) in exps.into_iter().enumerate() {
                    proba[[i, c]] = e / sum;
                }
            }
        }
        proba
    }

    fn raw_scores(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.stages.is_empty() {
            return Err(BuilderError::ModelNotFitted);
        }
        let n_outputs = self.n_outputs();
        let mut scores = Array2::zeros((x.nrows(), n_outputs));
        for k in 0..n_outputs {
            scores.column_mut(k).fill(self.initial_scores[k]);
        }
        for (trees, cols) in self.stages.iter().zip(&self.col_indices_per_stage) {
            let x_sub = x.select(Axis(1), cols);
            for (k, tree) in trees.iter().enumerate() {
                let update = tree.predict(&x_sub)?;
                scores.column_mut(k).scaled_add(self.config.learning_rate, &update);
            }
        }
        Ok(scores)
    }
}

impl Estimator for GradientBoostingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();

        self.n_classes = y.iter().cloned().fold(0.0f64, f64::max) as usize + 1;
        if self.n_classes < 2 {
            return Err(BuilderError::Training(
                "Gradient boosting needs at least two classes".to_string(),
            ));
        }
        let n_outputs = self.n_outputs();

        // One-hot targets; the binary case keeps only the positive column
        let mut targets = Array2::<f64>::zeros((n_samples, n_outputs));
        for (i, &label) in y.iter().enumerate() {
            let class = label as usize;
            if n_outputs == 1 {
                targets[[i, 0]] = if class == 1 { 1.0 } else { 0.0 };
            } else {
                targets[[i, class]] = 1.0;
            }
        }

        self.initial_scores = (0..n_outputs)
            .map(|k| {
                let p = targets.column(k).mean().unwrap_or(0.5).clamp(1e-10, 1.0 - 1e-10);
                if n_outputs == 1 {
                    (p / (1.0 - p)).ln()
                } else {
                    p.ln()
                }
            })
            .collect();
        self.stages.clear();
        self.col_indices_per_stage.clear();

        let mut scores = Array2::zeros((n_samples, n_outputs));
        for k in 0..n_outputs {
            scores.column_mut(k).fill(self.initial_scores[k]);
        }
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);

        for _ in 0..self.config.n_estimators {
            let proba = self.scores_to_proba(&scores);
            let rows = GradientBoostingConfig::sample_indices(n_samples, self.config.subsample, &mut rng);
            let cols = GradientBoostingConfig::sample_indices(n_features, self.config.colsample_bytree, &mut rng);
            let x_rows = x.select(Axis(0), &rows);
            let x_cols = x.select(Axis(1), &cols);

            let mut trees = Vec::with_capacity(n_outputs);
            for k in 0..n_outputs {
                let p_col = if n_outputs == 1 { proba.column(1) } else { proba.column(k) };
                let residuals = &targets.column(k) - &p_col;
                let tree = self.config.fit_stage_tree(&x_rows, &residuals, &rows, &cols, &mut rng)?;
                let update = tree.predict(&x_cols)?;
                scores.column_mut(k).scaled_add(self.config.learning_rate, &update);
                trees.push(tree);
            }

            self.stages.push(trees);
            self.col_indices_per_stage.push(cols);
        }

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.scores_to_proba(&self.raw_scores(x)?);
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| argmax(row.iter().copied()) as f64)
            .collect())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        Ok(Some(self.scores_to_proba(&self.raw_scores(x)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_regression_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((100, 2), (0..200).map(|i| i as f64 * 0.1).collect()).unwrap();
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|row| row[0] * 2.0 + row[1] * 0.5 + 1.0)
            .collect();
        (x, y)
    }

    fn create_classification_data(n_classes: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((90, 2), (0..180).map(|i| (i % 97) as f64 * 0.1).collect()).unwrap();
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|row| (((row[0] + row[1]) / 2.0) as usize % n_classes) as f64)
            .collect();
        (x, y)
    }

    fn small_config() -> GradientBoostingConfig {
        GradientBoostingConfig {
            n_estimators: 20,
            max_depth: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_gradient_boosting_regressor() {
        let (x, y) = create_regression_data();
        let mut model = GradientBoostingRegressor::new(small_config());
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_trees(), 20);

        let predictions = model.predict(&x).unwrap();
        let mse: f64 = y
            .iter()
            .zip(predictions.iter())
            .map(|(yi, pi)| (yi - pi).powi(2))
            .sum::<f64>()
            / y.len() as f64;
        let y_var = y.var(0.0);
        assert!(mse < y_var * 0.2, "MSE ({}) should be well below variance ({})", mse, y_var);
    }

    #[test]
    fn test_subsampled_rounds_still_reduce_error() {
        let (x, y) = create_regression_data();
        let config = GradientBoostingConfig {
            subsample: 0.8,
            colsample_bytree: 0.5,
            ..small_config()
        };
        let mut model = GradientBoostingRegressor::new(config);
        model.fit(&x, &y).unwrap();
        let predictions = model.predict(&x).unwrap();
        let mse: f64 = (&predictions - &y).mapv(|v| v * v).mean().unwrap();
        assert!(mse < y.var(0.0));
    }

    #[test]
    fn test_binary_classifier() {
        let (x, y) = create_classification_data(2);
        let mut model = GradientBoostingClassifier::new(small_config());
        model.fit(&x, &y).unwrap();

        let predictions = model.predict(&x).unwrap();
        let correct = y.iter().zip(predictions.iter()).filter(|(a, p)| a == p).count();
        assert!(correct as f64 / y.len() as f64 > 0.8);

        let proba = model.predict_proba(&x).unwrap().unwrap();
        assert_eq!(proba.ncols(), 2);
    }

    #[test]
    fn test_multiclass_probabilities() {
        let (x, y) = create_classification_data(3);
        let mut model = GradientBoostingClassifier::new(small_config());
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap().unwrap();
        assert_eq!(proba.ncols(), 3);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_predict_before_fit() {
        let model = GradientBoostingRegressor::default();
        assert!(matches!(
            model.predict(&Array2::zeros((1, 1))),
            Err(BuilderError::ModelNotFitted)
        ));
    }
}
