//! Preprocessing pipeline: raw table to standardized train/test matrices

use super::column::{string_values, ColumnValues};
use super::encoder::LabelEncoder;
use super::imputer::Imputer;
use super::scaler::StandardScaler;
use super::split::train_test_split;
use crate::error::{BuilderError, Result};
use crate::training::ProblemType;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Leading numeric substring accepted from free-text regression targets
const NUMERIC_SUBSTRING: &str = r"[-+]?\d*\.?\d+";

/// Fraction of rows held out for evaluation
const TEST_SIZE: f64 = 0.2;

/// Seed for the train/test shuffle
const SPLIT_SEED: u64 = 42;

/// Output of [`Preprocessor::run`]
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    /// Input columns, in matrix column order
    pub feature_names: Vec<String>,
    /// One encoder per text input column
    pub encoders: BTreeMap<String, LabelEncoder>,
    pub scaler: StandardScaler,
    /// Class vocabulary for classification targets
    pub target_encoder: Option<LabelEncoder>,
}

impl PreparedData {
    /// Rows that survived cleaning, before the split
    pub fn n_samples(&self) -> usize {
        self.x_train.nrows() + self.x_test.nrows()
    }

    pub fn n_classes(&self) -> Option<usize> {
        self.target_encoder.as_ref().map(LabelEncoder::n_classes)
    }
}

/// Cleans a raw table into numeric matrices ready for model fitting
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    imputer: Imputer,
}

/// Target column after missing-value removal
enum TargetValues {
    Labels(Vec<String>),
    Numbers(Vec<f64>),
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn `df` into train/test matrices for the given columns
    pub fn run(
        &self,
        df: &DataFrame,
        input_columns: &[String],
        output_column: &str,
        problem: ProblemType,
    ) -> Result<PreparedData> {
        // Drop rows without a target
        let raw_target = ColumnValues::from_frame(df, output_column)?;
        let keep: Vec<usize> = (0..raw_target.len())
            .filter(|&i| !raw_target.is_missing(i))
            .collect();

        if keep.is_empty() || input_columns.is_empty() {
            return Err(BuilderError::Validation(
                "Input or output column is empty. Please check your column selections.".to_string(),
            ));
        }

        // Impute and encode inputs
        let mut encoders = BTreeMap::new();
        let mut features: Vec<Vec<Option<f64>>> = Vec::with_capacity(input_columns.len());
        for name in input_columns {
            let column = ColumnValues::from_frame(df, name)?.select(&keep);
            match self.imputer.fill(&column) {
                ColumnValues::Numeric(values) => features.push(values),
                ColumnValues::Text(values) => {
                    let encoder = LabelEncoder::fit(values.iter().flatten().map(String::as_str));
                    let codes = values
                        .iter()
                        .map(|v| v.as_deref().and_then(|s| encoder.encode(s)).map(|c| c as f64))
                        .collect();
                    debug!(column = %name, categories = encoder.n_classes(), "Encoded categorical column");
                    features.push(codes);
                    encoders.insert(name.clone(), encoder);
                }
            }
        }

        // Convert the target and keep the rows it survives on
        let (target, mut rows) = match problem {
            ProblemType::Classification => {
                let series = df.column(output_column)?.as_materialized_series();
                let all = string_values(series)?;
                let labels: Vec<String> = keep
                    .iter()
                    .map(|&i| all[i].clone().unwrap_or_default())
                    .collect();
                let rows = (0..labels.len()).collect();
                (TargetValues::Labels(labels), rows)
            }
            ProblemType::Regression => {
                let numbers = coerce_regression_target(&raw_target.select(&keep), output_column)?;
                let rows: Vec<usize> = numbers
                    .iter()
                    .enumerate()
                    .filter_map(|(i, v)| v.map(|_| i))
                    .collect();
                let values = rows.iter().filter_map(|&i| numbers[i]).collect();
                (TargetValues::Numbers(values), rows)
            }
        };

        if rows.is_empty() {
            return Err(BuilderError::Validation(
                "No valid data remaining after preprocessing. Please check your input and output columns."
                    .to_string(),
            ));
        }

        // Drop rows that still miss an input value
        let complete: Vec<usize> = (0..rows.len())
            .filter(|&k| features.iter().all(|col| col[rows[k]].is_some()))
            .collect();
        if complete.is_empty() {
            return Err(BuilderError::Validation(
                "All rows have missing values in input columns after preprocessing.".to_string(),
            ));
        }
        let target = match target {
            TargetValues::Labels(v) => {
                TargetValues::Labels(complete.iter().map(|&k| v[rows[k]].clone()).collect())
            }
            TargetValues::Numbers(v) => TargetValues::Numbers(complete.iter().map(|&k| v[k]).collect()),
        };
        rows = complete.iter().map(|&k| rows[k]).collect();

        let (y, target_encoder) = match target {
            TargetValues::Labels(labels) => {
                let encoder = LabelEncoder::fit(labels.iter().map(String::as_str));
                let codes: Array1<f64> = labels
                    .iter()
                    .map(|l| encoder.encode(l).map(|c| c as f64).unwrap_or(0.0))
                    .collect();
                (codes, Some(encoder))
            }
            TargetValues::Numbers(values) => (Array1::from_vec(values), None),
        };

        if rows.len() != y.len() {
            return Err(BuilderError::Validation(
                "No matching indices between input and output data after preprocessing.".to_string(),
            ));
        }

        let x = Array2::from_shape_fn((rows.len(), features.len()), |(r, c)| {
            features[c][rows[r]].unwrap_or(0.0)
        });
        let (scaler, x_scaled) = StandardScaler::fit_transform(&x)?;

        let split = train_test_split(
            &x_scaled,
            &y,
            TEST_SIZE,
            SPLIT_SEED,
            problem == ProblemType::Classification,
        )?;

        info!(
            rows = rows.len(),
            features = input_columns.len(),
            categorical = encoders.len(),
            train = split.x_train.nrows(),
            test = split.x_test.nrows(),
            problem = %problem,
            "Preprocessing complete"
        );

        Ok(PreparedData {
            x_train: split.x_train,
            x_test: split.x_test,
            y_train: split.y_train,
            y_test: split.y_test,
            feature_names: input_columns.to_vec(),
            encoders,
            scaler,
            target_encoder,
        })
    }
}

/// Coerce a regression target to numbers.
///
/// Direct parsing is tried first. When nothing parses, the first numeric
/// substring of each value is used instead. Fails if neither yields a value.
fn coerce_regression_target(values: &ColumnValues, column: &str) -> Result<Vec<Option<f64>>> {
    let texts = match values {
        ColumnValues::Numeric(v) => return Ok(v.clone()),
        ColumnValues::Text(v) => v,
    };

    let total = texts.len();
    let parsed: Vec<Option<f64>> = texts
        .iter()
        .map(|v| v.as_deref().and_then(parse_finite))
        .collect();
    let valid = parsed.iter().filter(|v| v.is_some()).count();

    let parsed = if valid == 0 {
        let pattern = Regex::new(NUMERIC_SUBSTRING).map_err(|e| BuilderError::Computation(e.to_string()))?;
        texts
            .iter()
            .map(|v| {
                v.as_deref()
                    .and_then(|s| pattern.find(s))
                    .and_then(|m| parse_finite(m.as_str()))
            })
            .collect()
    } else {
        parsed
    };

    let valid = parsed.iter().filter(|v| v.is_some()).count();
    if valid == 0 {
        return Err(BuilderError::Validation(format!(
            "All values in the output column '{}' are invalid for regression. \
             Found {} values, but none could be converted to numeric. \
             Please ensure your output column contains numeric values for regression.",
            column, total
        )));
    }

    info!(column = %column, valid, total, "Regression target coerced to numeric");
    Ok(parsed)
}

fn parse_finite(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
