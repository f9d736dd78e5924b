//! Model Builder - pick the best baseline model for a CSV
//!
//! Upload a table, choose input and output columns, and the crate trains a
//! fixed roster of classifiers or regressors, scores them on a held-out split,
//! keeps the best one as a versioned JSON artifact and serves predictions.
//!
//! # Modules
//!
//! ## Model selection
//! - [`preprocessing`] - Imputation, categorical encoding, scaling, train/test split
//! - [`training`] - The [`training::Estimator`] trait, every roster algorithm and the batch runner
//! - [`metrics`] - Classification and regression metrics
//! - [`selection`] - Weighted best-model selection
//! - [`pipeline`] - End-to-end analysis
//! - [`artifact`] - Persisted models and prediction-time feature reconstruction
//!
//! ## Services
//! - [`registry`] - JSON registry with usage statistics
//! - [`monitoring`] - Process and system resource sampling
//! - [`server`] - HTTP API
//! - [`cli`] - Command-line interface

pub mod error;

pub mod preprocessing;
pub mod training;
pub mod metrics;
pub mod selection;
pub mod pipeline;
pub mod artifact;

pub mod registry;
pub mod monitoring;
pub mod server;
pub mod cli;

pub mod utils;

pub use error::{BuilderError, Result};

/// Prelude for common imports
pub mod prelude {
    pub use crate::artifact::{ModelArtifact, ModelStore, PredictionValue, RowPrediction};
    pub use crate::error::{BuilderError, Result};
    pub use crate::metrics::{ClassificationMetrics, Metrics, RegressionMetrics};
    pub use crate::pipeline::{analyze, AnalysisOptions, AnalysisReport};
    pub use crate::preprocessing::{LabelEncoder, PreparedData, Preprocessor, StandardScaler};
    pub use crate::training::{Algorithm, Estimator, ProblemType, TrainedModel};
    pub use crate::utils::DataLoader;
}
