//! Model training module
//!
//! Every algorithm in the roster implements [`Estimator`]:
//! - Linear models (OLS, Ridge, Lasso, multinomial logistic regression)
//! - Decision trees and Random Forests
//! - Gradient boosting
//! - K-Nearest Neighbors
//! - Gaussian Naive Bayes
//! - Support Vector Machines
//!
//! [`runner`] trains the fixed roster for a problem type and collects
//! per-algorithm predictions and timings.

pub mod decision_tree;
pub mod gradient_boosting;
pub mod knn;
pub mod linear_models;
pub mod naive_bayes;
pub mod random_forest;
pub mod svm;
mod model;
mod runner;

pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig, GradientBoostingRegressor};
pub use knn::{KNNClassifier, KNNConfig, KNNRegressor};
pub use linear_models::{LassoRegression, LinearRegression, LogisticRegression, RidgeRegression};
pub use model::TrainedModel;
pub use naive_bayes::GaussianNaiveBayes;
pub use random_forest::{MaxFeatures, RandomForest};
pub use runner::{
    knn_neighbors, roster, train_all, train_all_classification, train_all_regression, Algorithm,
    AlgorithmResult, RANDOM_STATE,
};
pub use svm::{SVMClassifier, SVMConfig, SVMRegressor};

use crate::error::{BuilderError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two supported problem types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemType {
    Classification,
    Regression,
}

impl ProblemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemType::Classification => "classification",
            ProblemType::Regression => "regression",
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProblemType {
    type Err = BuilderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "classification" => Ok(ProblemType::Classification),
            "regression" => Ok(ProblemType::Regression),
            _ => Err(BuilderError::InvalidInput(
                "problemType must be 'classification' or 'regression'".to_string(),
            )),
        }
    }
}

/// A trainable model: fit, predict, and optionally predict class probabilities.
///
/// Classifiers receive labels encoded as `0.0..n_classes` and return
/// probability columns in ascending class order.
pub trait Estimator: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predict one value (or class code) per row
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Class probabilities, or `None` for models without probability output
    fn predict_proba(&self, _x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        Ok(None)
    }
}

/// Fail unless `x` and `y` describe the same number of samples
pub(crate) fn check_shapes(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(BuilderError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(BuilderError::Training("Cannot fit on an empty dataset".to_string()));
    }
    Ok(())
}

/// Sorted distinct class codes present in `y`
pub(crate) fn class_labels(y: &Array1<f64>) -> Vec<f64> {
    let mut classes: Vec<f64> = y.iter().map(|v| v.round()).collect();
    classes.sort_by(|a, b| a.total_cmp(b));
    classes.dedup();
    classes
}

/// Index of the largest value; the first one wins on ties
pub(crate) fn argmax(values: impl IntoIterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, v) in values.into_iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_problem_type_parsing() {
        assert_eq!("classification".parse::<ProblemType>().unwrap(), ProblemType::Classification);
        assert_eq!("regression".parse::<ProblemType>().unwrap(), ProblemType::Regression);
        assert!("clustering".parse::<ProblemType>().is_err());
        assert_eq!(ProblemType::Regression.to_string(), "regression");
    }

    #[test]
    fn test_class_labels_sorted_unique() {
        let y = array![2.0, 0.0, 1.0, 2.0, 0.0];
        assert_eq!(class_labels(&y), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_argmax_first_wins() {
        assert_eq!(argmax([0.2, 0.5, 0.5, 0.1]), 1);
        assert_eq!(argmax(Vec::<f64>::new()), 0);
    }

    #[test]
    fn test_check_shapes() {
        let x = array![[1.0], [2.0]];
        assert!(check_shapes(&x, &array![1.0, 2.0]).is_ok());
        assert!(check_shapes(&x, &array![1.0]).is_err());
    }
}
