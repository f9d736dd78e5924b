//! End-to-end analysis: preprocess, train the roster, score, select, package

use crate::artifact::ModelArtifact;
use crate::error::{BuilderError, Result};
use crate::metrics::{compute_metrics, Metrics};
use crate::preprocessing::Preprocessor;
use crate::selection::{select_best, EvaluatedResult};
use crate::training::{train_all, ProblemType};
use chrono::Utc;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, warn};

/// Optional metadata attached to the produced artifact
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// One roster entry as reported to the caller
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmSummary {
    pub algorithm: String,
    pub metrics: Metrics,
    pub training_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BestMetric {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub algorithm: String,
    pub metrics: Metrics,
    pub training_time: f64,
    pub justification: String,
    pub best_metric: BestMetric,
}

/// Result of [`analyze`]; the artifact is ready to persist
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub recommended: Recommendation,
    /// Every trained algorithm, in roster order
    pub results: Vec<AlgorithmSummary>,
    pub artifact: ModelArtifact,
}

fn quoted_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("'{}'", s)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Map requested column names onto the table's columns, comparing with
/// surrounding whitespace removed. An exact match wins; otherwise a
/// case-insensitive match is accepted when it is unambiguous.
pub fn resolve_columns(
    available: &[String],
    input_columns: &[String],
    output_column: &str,
) -> Result<(Vec<String>, String)> {
    let by_trimmed: HashMap<&str, &String> = available.iter().map(|c| (c.trim(), c)).collect();
    let mut by_folded: HashMap<String, Vec<&String>> = HashMap::new();
    for column in available {
        by_folded.entry(column.trim().to_lowercase()).or_default().push(column);
    }
    let lookup = |requested: &str| -> Option<String> {
        let requested = requested.trim();
        if let Some(actual) = by_trimmed.get(requested) {
            return Some((*actual).clone());
        }
        match by_folded.get(&requested.to_lowercase()).map(Vec::as_slice) {
            Some([only]) => Some((*only).clone()),
            _ => None,
        }
    };

    let mut missing = Vec::new();
    let mut inputs = Vec::with_capacity(input_columns.len());
    for requested in input_columns {
        match lookup(requested) {
            Some(actual) => inputs.push(actual),
            None => missing.push(requested.trim().to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(BuilderError::InvalidInput(format!(
            "Input columns not found in CSV: {}. Available columns: {}",
            quoted_list(&missing),
            quoted_list(available)
        )));
    }

    let output = lookup(output_column).ok_or_else(|| {
        BuilderError::InvalidInput(format!(
            "Output column '{}' not found in CSV. Available columns: {}",
            output_column,
            quoted_list(available)
        ))
    })?;

    if inputs.contains(&output) {
        return Err(BuilderError::InvalidInput(
            "Output column cannot be in input columns".to_string(),
        ));
    }
    Ok((inputs, output))
}

/// Run the full model-selection pipeline on `df`
pub fn analyze(
    df: &DataFrame,
    input_columns: &[String],
    output_column: &str,
    problem: ProblemType,
    options: AnalysisOptions,
) -> Result<AnalysisReport> {
    let start = Instant::now();
    let available: Vec<String> = df.get_column_names().iter().map(|c| c.to_string()).collect();
    let (inputs, output) = resolve_columns(&available, input_columns, output_column)?;

    let data = Preprocessor::new().run(df, &inputs, &output, problem)?;
    info!(
        problem = %problem,
        train_rows = data.x_train.nrows(),
        test_rows = data.x_test.nrows(),
        features = data.feature_names.len(),
        "Prepared dataset"
    );

    let trained = train_all(problem, &data.x_train, &data.y_train, &data.x_test);
    if trained.is_empty() {
        return Err(BuilderError::NoAlgorithmsTrained);
    }

    let mut evaluated = Vec::with_capacity(trained.len());
    for r in trained {
        let metrics = compute_metrics(problem, &data.y_test, &r.predictions, r.probabilities.as_ref())?;
        if !metrics.is_finite() {
            warn!(algorithm = %r.algorithm, metrics = ?metrics, "Discarding algorithm with non-finite metrics");
            continue;
        }
        evaluated.push(EvaluatedResult {
            algorithm: r.algorithm,
            metrics,
            training_time: r.training_time,
            model: r.model,
        });
    }
    if evaluated.is_empty() {
        return Err(BuilderError::NoAlgorithmsTrained);
    }

    let selection = select_best(&evaluated, problem)?;
    let best = selection.best;
    let (metric_name, metric_value) = best.metrics.best_metric();

    let results = evaluated
        .iter()
        .map(|r| AlgorithmSummary {
            algorithm: r.algorithm.display_name().to_string(),
            metrics: r.metrics.clone(),
            training_time: r.training_time,
        })
        .collect();

    let algorithm = best.algorithm.display_name().to_string();
    let artifact = ModelArtifact {
        schema_version: crate::artifact::SCHEMA_VERSION,
        model_id: String::new(),
        algorithm: algorithm.clone(),
        problem_type: problem,
        input_columns: data.feature_names.clone(),
        output_column: output,
        metrics: best.metrics.clone(),
        model: best.model.clone(),
        encoders: data.encoders.clone(),
        scaler: Some(data.scaler.clone()),
        target_encoder: data.target_encoder.clone(),
        name: options.name.unwrap_or_else(|| format!("{} model", algorithm)),
        description: options.description,
        created_at: Utc::now(),
    };

    info!(
        algorithm = %algorithm,
        score = selection.score,
        candidates = evaluated.len(),
        elapsed_secs = start.elapsed().as_secs_f64(),
        "Selected best model"
    );

    Ok(AnalysisReport {
        recommended: Recommendation {
            algorithm,
            metrics: best.metrics.clone(),
            training_time: best.training_time,
            justification: selection.justification.clone(),
            best_metric: BestMetric {
                name: metric_name.to_string(),
                value: metric_value,
            },
        },
        results,
        artifact,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_trims_whitespace() {
        let available = cols(&[" age", "income ", "label"]);
        let (inputs, output) = resolve_columns(&available, &cols(&["age", " income"]), "label ").unwrap();
        assert_eq!(inputs, cols(&[" age", "income "]));
        assert_eq!(output, "label");
    }

    #[test]
    fn test_resolve_ignores_case_when_unambiguous() {
        let available = cols(&["Age", "City", "city ", "Label"]);
        let (inputs, output) = resolve_columns(&available, &cols(&["age"]), "LABEL").unwrap();
        assert_eq!(inputs, cols(&["Age"]));
        assert_eq!(output, "Label");

        // "CITY" folds onto two columns
        assert!(resolve_columns(&available, &cols(&["CITY"]), "Label").is_err());
        let (inputs, _) = resolve_columns(&available, &cols(&["city"]), "Label").unwrap();
        assert_eq!(inputs, cols(&["city "]));
    }

    #[test]
    fn test_resolve_reports_missing_inputs() {
        let err = resolve_columns(&cols(&["a", "b"]), &cols(&["a", "zzz"]), "b").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Input columns not found in CSV: ['zzz']. Available columns: ['a', 'b']"
        );
    }

    #[test]
    fn test_resolve_reports_missing_output() {
        let err = resolve_columns(&cols(&["a", "b"]), &cols(&["a"]), "c").unwrap_err();
        assert!(err.to_string().starts_with("Output column 'c' not found in CSV"));
    }

    #[test]
    fn test_output_cannot_be_input() {
        let err = resolve_columns(&cols(&["a", "b"]), &cols(&["a", "b "]), "b").unwrap_err();
        assert_eq!(err.to_string(), "Output column cannot be in input columns");
    }
}
