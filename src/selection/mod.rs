//! Best-model selection over evaluated candidates

use crate::error::{BuilderError, Result};
use crate::metrics::{ClassificationMetrics, Metrics, RegressionMetrics};
use crate::training::{Algorithm, ProblemType, TrainedModel};

/// A trained candidate with its held-out metrics
#[derive(Debug, Clone)]
pub struct EvaluatedResult {
    pub algorithm: Algorithm,
    pub metrics: Metrics,
    /// Seconds
    pub training_time: f64,
    pub model: TrainedModel,
}

/// The winning candidate
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    pub index: usize,
    pub best: &'a EvaluatedResult,
    pub score: f64,
    pub justification: String,
}

/// 0.5·accuracy + 0.3·F1 + 0.2·precision
pub fn classification_score(m: &ClassificationMetrics) -> f64 {
    0.5 * m.accuracy + 0.3 * m.f1_score + 0.2 * m.precision
}

/// 0.6·R² + 0.4·(1 − min(rmse / max_rmse, 1)); normalised RMSE is 1 when `max_rmse` is 0
pub fn regression_score(m: &RegressionMetrics, max_rmse: f64) -> f64 {
    let normalized = if max_rmse > 0.0 {
        (m.root_mean_squared_error / max_rmse).min(1.0)
    } else {
        1.0
    };
    0.6 * m.r2_score + 0.4 * (1.0 - normalized)
}

fn percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

fn justify(metrics: &Metrics) -> String {
    match metrics {
        Metrics::Classification(m) => format!(
            "This algorithm achieved the best overall performance with an accuracy of {}, \
             F1 score of {}, and precision of {}. It demonstrates strong predictive capability \
             with balanced performance across all key metrics.",
            percent(m.accuracy),
            percent(m.f1_score),
            percent(m.precision)
        ),
        Metrics::Regression(m) => format!(
            "This algorithm achieved the best overall performance with an R² score of {:.4}, \
             RMSE of {:.4}, and MAE of {:.4}. It provides the most accurate predictions with \
             the lowest error rates.",
            m.r2_score, m.root_mean_squared_error, m.mean_absolute_error
        ),
    }
}

/// Weighted scores for every candidate, in input order
pub fn scores(results: &[EvaluatedResult], problem: ProblemType) -> Result<Vec<f64>> {
    let max_rmse = results
        .iter()
        .filter_map(|r| match &r.metrics {
            Metrics::Regression(m) => Some(m.root_mean_squared_error),
            Metrics::Classification(_) => None,
        })
        .filter(|rmse| rmse.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);

    results
        .iter()
        .map(|r| match (&r.metrics, problem) {
            (Metrics::Classification(m), ProblemType::Classification) => Ok(classification_score(m)),
            (Metrics::Regression(m), ProblemType::Regression) => Ok(regression_score(m, max_rmse)),
            (metrics, problem) => Err(BuilderError::Computation(format!(
                "{} produced {} metrics for a {} problem",
                r.algorithm,
                metrics.problem_type(),
                problem
            ))),
        })
        .collect()
}

/// Pick the highest weighted score; the first candidate wins ties.
/// Candidates whose score is not finite are never selected.
pub fn select_best(results: &[EvaluatedResult], problem: ProblemType) -> Result<Selection<'_>> {
    let scores = scores(results, problem)?;

    let mut best: Option<(usize, f64)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if !score.is_finite() {
            continue;
        }
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((idx, score));
        }
    }

    let (index, score) = best.ok_or_else(|| {
        let reason = if results.is_empty() {
            "No results to select from"
        } else {
            "No result has a finite score"
        };
        BuilderError::Computation(reason.to_string())
    })?;
    let winner = &results[index];

    Ok(Selection {
        index,
        best: winner,
        score,
        justification: justify(&winner.metrics),
    })
}
