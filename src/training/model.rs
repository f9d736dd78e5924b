//! Serializable wrapper over every estimator in the roster

use super::decision_tree::DecisionTree;
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingRegressor};
use super::knn::{KNNClassifier, KNNRegressor};
use super::linear_models::{LassoRegression, LinearRegression, LogisticRegression, RidgeRegression};
use super::naive_bayes::GaussianNaiveBayes;
use super::random_forest::RandomForest;
use super::svm::{SVMClassifier, SVMRegressor};
use super::Estimator;
use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Enum to hold trained model variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params")]
pub enum TrainedModel {
    LinearRegression(LinearRegression),
    RidgeRegression(RidgeRegression),
    LassoRegression(LassoRegression),
    LogisticRegression(LogisticRegression),
    DecisionTreeClassifier(DecisionTree),
    DecisionTreeRegressor(DecisionTree),
    RandomForestClassifier(RandomForest),
    RandomForestRegressor(RandomForest),
    GradientBoostingClassifier(GradientBoostingClassifier),
    GradientBoostingRegressor(GradientBoostingRegressor),
    KNNClassifier(KNNClassifier),
    KNNRegressor(KNNRegressor),
    GaussianNaiveBayes(GaussianNaiveBayes),
    SVMClassifier(SVMClassifier),
    SVMRegressor(SVMRegressor),
}

impl TrainedModel {
    fn inner(&self) -> &dyn Estimator {
        match self {
            TrainedModel::LinearRegression(m) => m,
            TrainedModel::RidgeRegression(m) => m,
            TrainedModel::LassoRegression(m) => m,
            TrainedModel::LogisticRegression(m) => m,
            TrainedModel::DecisionTreeClassifier(m) | TrainedModel::DecisionTreeRegressor(m) => m,
            TrainedModel::RandomForestClassifier(m) | TrainedModel::RandomForestRegressor(m) => m,
            TrainedModel::GradientBoostingClassifier(m) => m,
            TrainedModel::GradientBoostingRegressor(m) => m,
            TrainedModel::KNNClassifier(m) => m,
            TrainedModel::KNNRegressor(m) => m,
            TrainedModel::GaussianNaiveBayes(m) => m,
            TrainedModel::SVMClassifier(m) => m,
            TrainedModel::SVMRegressor(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Estimator {
        match self {
            TrainedModel::LinearRegression(m) => m,
            TrainedModel::RidgeRegression(m) => m,
            TrainedModel::LassoRegression(m) => m,
            TrainedModel::LogisticRegression(m) => m,
            TrainedModel::DecisionTreeClassifier(m) | TrainedModel::DecisionTreeRegressor(m) => m,
            TrainedModel::RandomForestClassifier(m) | TrainedModel::RandomForestRegressor(m) => m,
            TrainedModel::GradientBoostingClassifier(m) => m,
            TrainedModel::GradientBoostingRegressor(m) => m,
            TrainedModel::KNNClassifier(m) => m,
            TrainedModel::KNNRegressor(m) => m,
            TrainedModel::GaussianNaiveBayes(m) => m,
            TrainedModel::SVMClassifier(m) => m,
            TrainedModel::SVMRegressor(m) => m,
        }
    }

    /// Whether the variant can produce class probabilities
    pub fn supports_proba(&self) -> bool {
        !matches!(
            self,
            TrainedModel::LinearRegression(_)
                | TrainedModel::RidgeRegression(_)
                | TrainedModel::LassoRegression(_)
                | TrainedModel::DecisionTreeRegressor(_)
                | TrainedModel::RandomForestRegressor(_)
                | TrainedModel::GradientBoostingRegressor(_)
                | TrainedModel::KNNRegressor(_)
                | TrainedModel::SVMRegressor(_)
        )
    }
}

impl Estimator for TrainedModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict(x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        if !self.supports_proba() {
            return Ok(None);
        }
        self.inner().predict_proba(x)
    }
}
