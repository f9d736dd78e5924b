//! K-Nearest Neighbors implementation
//!
//! Brute-force neighbour search with a bounded max-heap per query row;
//! query rows are processed in parallel.

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{argmax, check_shapes, Estimator};
use crate::error::{BuilderError, Result};

/// KNN configuration; neighbours are found by Euclidean distance and vote uniformly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    pub n_neighbors: usize,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self { n_neighbors: 5 }
    }
}

/// Stored training set shared by both KNN flavours
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TrainingSet {
    x: Option<Array2<f64>>,
    y: Option<Array1<f64>>,
}

impl TrainingSet {
    fn store(&mut self, x: &Array2<f64>, y: &Array1<f64>, k: usize) -> Result<()> {
        check_shapes(x, y)?;
        if k == 0 {
            return Err(BuilderError::Training("n_neighbors must be at least 1".to_string()));
        }
        self.x = Some(x.clone());
        self.y = Some(y.clone());
        Ok(())
    }

    /// Neighbour lists (distance, label) for every query row
    fn neighbors(&self, x: &Array2<f64>, config: &KNNConfig) -> Result<Vec<Vec<(f64, f64)>>> {
        let x_train = self.x.as_ref().ok_or(BuilderError::ModelNotFitted)?;
        let y_train = self.y.as_ref().ok_or(BuilderError::ModelNotFitted)?;
        if x.ncols() != x_train.ncols() {
            return Err(BuilderError::ShapeError {
                expected: format!("{} features", x_train.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.rows()
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|row| find_k_nearest(row, x_train, y_train, config.n_neighbors))
            .collect())
    }
}

/// K-Nearest Neighbors Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    config: KNNConfig,
    train: TrainingSet,
    n_classes: usize,
}

impl KNNClassifier {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            train: TrainingSet::default(),
            n_classes: 0,
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig { n_neighbors: k })
    }

    pub fn n_neighbors(&self) -> usize {
        self.config.n_neighbors
    }
}

impl Estimator for KNNClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.train.store(x, y, self.config.n_neighbors)?;
        self.n_classes = y.iter().cloned().fold(0.0f64, f64::max) as usize + 1;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self
            .predict_proba(x)?
            .ok_or(BuilderError::ModelNotFitted)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| argmax(row.iter().copied()) as f64)
            .collect())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        let neighbors = self.train.neighbors(x, &self.config)?;
        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for (i, list) in neighbors.iter().enumerate() {
            let probs = class_probs_from(list, self.n_classes);
            for (c, p) in probs.into_iter().enumerate() {
                proba[[i, c]] = p;
            }
        }
        Ok(Some(proba))
    }
}

/// K-Nearest Neighbors Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNRegressor {
    config: KNNConfig,
    train: TrainingSet,
}

impl KNNRegressor {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            train: TrainingSet::default(),
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig { n_neighbors: k })
    }
}

impl Estimator for KNNRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.train.store(x, y, self.config.n_neighbors)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let neighbors = self.train.neighbors(x, &self.config)?;
        Ok(neighbors
            .iter()
            .map(|list| mean_label(list))
            .collect())
    }
}

/// Max-heap entry: (distance, training index, label). Ordered by distance,
/// then index, so equidistant neighbours resolve to the earlier training row.
#[derive(PartialEq)]
struct Candidate(f64, usize, f64);

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

/// Keep the k closest training rows, O(n log k)
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    k: usize,
) -> Vec<(f64, f64)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (i, row) in x_train.rows().into_iter().enumerate() {
        let candidate = Candidate(euclidean(point, row), i, y_train[i]);
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|top| candidate < *top) {
            heap.pop();
            heap.push(candidate);
        }
    }

    heap.into_sorted_vec().into_iter().map(|c| (c.0, c.2)).collect()
}

fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(ai, bi)| (ai - bi) * (ai - bi))
        .sum::<f64>()
        .sqrt()
}

fn class_probs_from(neighbors: &[(f64, f64)], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0.0; n_classes];
    let mut total = 0.0;
    for &(_, label) in neighbors {
        if let Some(slot) = counts.get_mut(label as usize) {
            *slot += 1.0;
            total += 1.0;
        }
    }
    if total > 0.0 {
        counts.iter_mut().for_each(|c| *c /= total);
    }
    counts
}

fn mean_label(neighbors: &[(f64, f64)]) -> f64 {
    if neighbors.is_empty() {
        return 0.0;
    }
    neighbors.iter().map(|&(_, y)| y).sum::<f64>() / neighbors.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec(
            (20, 2),
            vec![
                // Class 0 (low values)
                1.0, 1.0, 1.5, 1.5, 2.0, 2.0, 2.5, 2.5, 1.0, 2.0, 1.5, 2.5, 2.0, 1.5, 2.5, 1.0, 1.2, 1.8, 1.8, 1.2,
                // Class 1 (high values)
                8.0, 8.0, 8.5, 8.5, 9.0, 9.0, 9.5, 9.5, 8.0, 9.0, 8.5, 9.5, 9.0, 8.5, 9.5, 8.0, 8.2, 8.8, 8.8, 8.2,
            ],
        )
        .unwrap();
        let y = Array1::from_shape_fn(20, |i| if i < 10 { 0.0 } else { 1.0 });
        (x, y)
    }

    #[test]
    fn test_knn_classifier() {
        let (x, y) = create_classification_data();
        let mut knn = KNNClassifier::with_k(3);
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_knn_probabilities() {
        let x = array![[0.0], [1.0], [2.0], [10.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut knn = KNNClassifier::with_k(3);
        knn.fit(&x, &y).unwrap();

        let proba = knn.predict_proba(&array![[0.5]]).unwrap().unwrap();
        assert!((proba[[0, 0]] - 2.0 / 3.0).abs() < 1e-12);
        assert!((proba[[0, 1]] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_knn_regressor() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let y = array![0.0, 10.0, 20.0, 30.0, 40.0];
        let mut knn = KNNRegressor::with_k(3);
        knn.fit(&x, &y).unwrap();

        let predictions = knn.predict(&array![[2.0]]).unwrap();
        assert!((predictions[0] - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let x = array![[0.0], [1.0]];
        let y = array![1.0, 3.0];
        let mut knn = KNNRegressor::with_k(5);
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&array![[0.0]]).unwrap(), array![2.0]);
    }

    #[test]
    fn test_euclidean_distance() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        assert!((euclidean(a.view(), b.view()) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_unfitted_errors() {
        let knn = KNNRegressor::with_k(3);
        assert!(matches!(knn.predict(&array![[0.0]]), Err(BuilderError::ModelNotFitted)));
    }
}
