//! Fixed algorithm roster and the batch runner that trains it

use super::decision_tree::DecisionTree;
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig, GradientBoostingRegressor};
use super::knn::{KNNClassifier, KNNRegressor};
use super::linear_models::{LassoRegression, LinearRegression, LogisticRegression, RidgeRegression};
use super::model::TrainedModel;
use super::naive_bayes::GaussianNaiveBayes;
use super::random_forest::RandomForest;
use super::svm::{SVMClassifier, SVMRegressor};
use super::{Estimator, ProblemType};
use crate::error::{BuilderError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};

/// Seed shared by every stochastic algorithm
pub const RANDOM_STATE: u64 = 42;

const N_TREES: usize = 100;
const TREE_MAX_DEPTH: usize = 10;
const BOOSTING_MAX_DEPTH: usize = 5;

/// Algorithms in the roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    LogisticRegression,
    LinearRegression,
    RidgeRegression,
    LassoRegression,
    RandomForest,
    SupportVectorMachine,
    KNearestNeighbors,
    NaiveBayes,
    DecisionTree,
    GradientBoosting,
}

impl Algorithm {
    pub fn display_name(&self) -> &'static str {
        match self {
            Algorithm::LogisticRegression => "Logistic Regression",
            Algorithm::LinearRegression => "Linear Regression",
            Algorithm::RidgeRegression => "Ridge Regression",
            Algorithm::LassoRegression => "Lasso Regression",
            Algorithm::RandomForest => "Random Forest",
            Algorithm::SupportVectorMachine => "Support Vector Machine",
            Algorithm::KNearestNeighbors => "K-Nearest Neighbors",
            Algorithm::NaiveBayes => "Naive Bayes",
            Algorithm::DecisionTree => "Decision Tree",
            Algorithm::GradientBoosting => "Gradient Boosting",
        }
    }

    /// Unfitted model configured the way the roster trains it
    pub fn build(&self, problem: ProblemType, n_train: usize) -> Result<TrainedModel> {
        let boosting = GradientBoostingConfig {
            n_estimators: N_TREES,
            max_depth: BOOSTING_MAX_DEPTH,
            random_state: RANDOM_STATE,
            ..Default::default()
        };
        let k = knn_neighbors(n_train);

        let model = match (problem, self) {
            (ProblemType::Classification, Algorithm::LogisticRegression) => {
                TrainedModel::LogisticRegression(LogisticRegression::new().with_max_iter(1000))
            }
            (ProblemType::Classification, Algorithm::RandomForest) => TrainedModel::RandomForestClassifier(
                RandomForest::new_classifier(N_TREES).with_random_state(RANDOM_STATE),
            ),
            (ProblemType::Classification, Algorithm::SupportVectorMachine) => {
                TrainedModel::SVMClassifier(SVMClassifier::default())
            }
            (ProblemType::Classification, Algorithm::KNearestNeighbors) => {
                TrainedModel::KNNClassifier(KNNClassifier::with_k(k))
            }
            (ProblemType::Classification, Algorithm::NaiveBayes) => {
                TrainedModel::GaussianNaiveBayes(GaussianNaiveBayes::new())
            }
            (ProblemType::Classification, Algorithm::DecisionTree) => TrainedModel::DecisionTreeClassifier(
                DecisionTree::new_classifier()
                    .with_max_depth(TREE_MAX_DEPTH)
                    .with_random_state(RANDOM_STATE),
            ),
            (ProblemType::Classification, Algorithm::GradientBoosting) => {
                TrainedModel::GradientBoostingClassifier(GradientBoostingClassifier::new(boosting))
            }
            (ProblemType::Regression, Algorithm::LinearRegression) => {
                TrainedModel::LinearRegression(LinearRegression::new())
            }
            (ProblemType::Regression, Algorithm::RidgeRegression) => {
                TrainedModel::RidgeRegression(RidgeRegression::new(1.0))
            }
            (ProblemType::Regression, Algorithm::LassoRegression) => {
                TrainedModel::LassoRegression(LassoRegression::new(1.0).with_max_iter(1000))
            }
            (ProblemType::Regression, Algorithm::RandomForest) => TrainedModel::RandomForestRegressor(
                RandomForest::new_regressor(N_TREES).with_random_state(RANDOM_STATE),
            ),
            (ProblemType::Regression, Algorithm::SupportVectorMachine) => {
                TrainedModel::SVMRegressor(SVMRegressor::default())
            }
            (ProblemType::Regression, Algorithm::KNearestNeighbors) => {
                TrainedModel::KNNRegressor(KNNRegressor::with_k(k))
            }
            (ProblemType::Regression, Algorithm::DecisionTree) => TrainedModel::DecisionTreeRegressor(
                DecisionTree::new_regressor()
                    .with_max_depth(TREE_MAX_DEPTH)
                    .with_random_state(RANDOM_STATE),
            ),
            (ProblemType::Regression, Algorithm::GradientBoosting) => {
                TrainedModel::GradientBoostingRegressor(GradientBoostingRegressor::new(boosting))
            }
            (problem, algorithm) => {
                return Err(BuilderError::Training(format!(
                    "{} is not available for {}",
                    algorithm.display_name(),
                    problem
                )))
            }
        };
        Ok(model)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Roster for a problem type, in training order
pub fn roster(problem: ProblemType) -> Vec<Algorithm> {
    match problem {
        ProblemType::Classification => vec![
            Algorithm::LogisticRegression,
            Algorithm::RandomForest,
            Algorithm::SupportVectorMachine,
            Algorithm::KNearestNeighbors,
            Algorithm::NaiveBayes,
            Algorithm::DecisionTree,
            Algorithm::GradientBoosting,
        ],
        ProblemType::Regression => vec![
            Algorithm::LinearRegression,
            Algorithm::RidgeRegression,
            Algorithm::LassoRegression,
            Algorithm::RandomForest,
            Algorithm::SupportVectorMachine,
            Algorithm::KNearestNeighbors,
            Algorithm::DecisionTree,
            Algorithm::GradientBoosting,
        ],
    }
}

/// k = clamp(round(sqrt(n_train)), 3, 20)
pub fn knn_neighbors(n_train: usize) -> usize {
    ((n_train as f64).sqrt().round() as usize).clamp(3, 20)
}

/// One trained algorithm and its held-out predictions
#[derive(Debug, Clone)]
pub struct AlgorithmResult {
    pub algorithm: Algorithm,
    pub model: TrainedModel,
    pub predictions: Array1<f64>,
    pub probabilities: Option<Array2<f64>>,
    /// Fit plus test-set prediction, in seconds
    pub training_time: f64,
}

fn train_one(
    algorithm: Algorithm,
    problem: ProblemType,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    x_test: &Array2<f64>,
) -> Result<AlgorithmResult> {
    let start = Instant::now();
    let mut model = algorithm.build(problem, x_train.nrows())?;
    model.fit(x_train, y_train)?;
    let predictions = model.predict(x_test)?;
    let probabilities = match problem {
        ProblemType::Classification => model.predict_proba(x_test)?,
        ProblemType::Regression => None,
    };
    if predictions.iter().any(|v| !v.is_finite()) {
        return Err(BuilderError::Training(format!(
            "{} produced non-finite predictions",
            algorithm
        )));
    }

    Ok(AlgorithmResult {
        algorithm,
        model,
        predictions,
        probabilities,
        training_time: start.elapsed().as_secs_f64(),
    })
}

/// Train every roster algorithm for `problem`. A failing algorithm is
/// logged and skipped; the returned list may be empty.
pub fn train_all(
    problem: ProblemType,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    x_test: &Array2<f64>,
) -> Vec<AlgorithmResult> {
    roster(problem)
        .into_iter()
        .filter_map(|algorithm| match train_one(algorithm, problem, x_train, y_train, x_test) {
            Ok(result) => {
                info!(
                    algorithm = %algorithm,
                    training_time = result.training_time,
                    "Trained algorithm"
                );
                Some(result)
            }
            Err(e) => {
                warn!(algorithm = %algorithm, error = %e, "Algorithm failed, skipping");
                None
            }
        })
        .collect()
}

pub fn train_all_classification(
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    x_test: &Array2<f64>,
) -> Vec<AlgorithmResult> {
    train_all(ProblemType::Classification, x_train, y_train, x_test)
}

pub fn train_all_regression(
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    x_test: &Array2<f64>,
) -> Vec<AlgorithmResult> {
    train_all(ProblemType::Regression, x_train, y_train, x_test)
}
