//! Evaluation metrics for held-out predictions
//!
//! Classification metrics use support-weighted averaging over every label
//! present in either the truth or the predictions. Zero division counts as 0.

use crate::error::{BuilderError, Result};
use crate::training::ProblemType;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Classification metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// `None` when no probabilities exist or the score is undefined
    pub roc_auc: Option<f64>,
}

/// Regression metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionMetrics {
    pub r2_score: f64,
    pub mean_squared_error: f64,
    pub mean_absolute_error: f64,
    pub root_mean_squared_error: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_squared_log_error: Option<f64>,
}

/// Metrics of either problem type, serialised without a tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metrics {
    Classification(ClassificationMetrics),
    Regression(RegressionMetrics),
}

impl Metrics {
    /// Headline metric: accuracy for classification, R² for regression
    pub fn best_metric(&self) -> (&'static str, f64) {
        match self {
            Metrics::Classification(m) => ("accuracy", m.accuracy),
            Metrics::Regression(m) => ("r2Score", m.r2_score),
        }
    }

    pub fn problem_type(&self) -> ProblemType {
        match self {
            Metrics::Classification(_) => ProblemType::Classification,
            Metrics::Regression(_) => ProblemType::Regression,
        }
    }

    /// Every reported value is finite. JSON cannot carry NaN or infinities,
    /// so only finite metrics can be persisted and read back.
    pub fn is_finite(&self) -> bool {
        match self {
            Metrics::Classification(m) => {
                [m.accuracy, m.precision, m.recall, m.f1_score].iter().all(|v| v.is_finite())
                    && m.roc_auc.map_or(true, f64::is_finite)
            }
            Metrics::Regression(m) => {
                [m.r2_score, m.mean_squared_error, m.mean_absolute_error, m.root_mean_squared_error]
                    .iter()
                    .all(|v| v.is_finite())
                    && m.mean_squared_log_error.map_or(true, f64::is_finite)
            }
        }
    }
}

fn check_lengths(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(BuilderError::ShapeError {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{} predictions", y_pred.len()),
        });
    }
    if y_true.is_empty() {
        return Err(BuilderError::Computation("Cannot compute metrics on an empty set".to_string()));
    }
    Ok(())
}

/// Accuracy, weighted precision/recall/F1 and ROC-AUC when `y_proba` is given
pub fn classification_metrics(
    y_true: &Array1<f64>,
    y_pred: &Array1<f64>,
    y_proba: Option<&Array2<f64>>,
) -> Result<ClassificationMetrics> {
    check_lengths(y_true, y_pred)?;
    let n = y_true.len() as f64;

    let truth: Vec<i64> = y_true.iter().map(|v| v.round() as i64).collect();
    let preds: Vec<i64> = y_pred.iter().map(|v| v.round() as i64).collect();

    let correct = truth.iter().zip(&preds).filter(|(t, p)| t == p).count();

    // label -> (tp, fp, fn, support)
    let mut counts: BTreeMap<i64, (usize, usize, usize, usize)> = BTreeMap::new();
    for (&t, &p) in truth.iter().zip(&preds) {
        counts.entry(t).or_default().3 += 1;
        if t == p {
            counts.entry(t).or_default().0 += 1;
        } else {
            counts.entry(p).or_default().1 += 1;
            counts.entry(t).or_default().2 += 1;
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
    for &(tp, fp, fn_, support) in counts.values() {
        let weight = support as f64 / n;
        let p = ratio(tp, tp + fp);
        let r = ratio(tp, tp + fn_);
        precision += weight * p;
        recall += weight * r;
        f1 += weight * if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
    }

    Ok(ClassificationMetrics {
        accuracy: correct as f64 / n,
        precision,
        recall,
        f1_score: f1,
        roc_auc: y_proba.and_then(|proba| roc_auc(&truth, proba)),
    })
}

/// Binary when the truth holds at most two labels (positive = the larger one,
/// scored by column 1 or the only column); otherwise one-vs-rest weighted by
/// support, which needs one probability column per observed label.
fn roc_auc(truth: &[i64], proba: &Array2<f64>) -> Option<f64> {
    if proba.nrows() != truth.len() || proba.ncols() == 0 {
        return None;
    }
    let mut labels: Vec<i64> = truth.to_vec();
    labels.sort_unstable();
    labels.dedup();

    if labels.len() <= 2 {
        let positive = *labels.last()?;
        let column = if proba.ncols() > 1 { 1 } else { 0 };
        let is_positive: Vec<bool> = truth.iter().map(|&t| t == positive).collect();
        let scores: Vec<f64> = proba.column(column).to_vec();
        return binary_auc(&is_positive, &scores);
    }

    if proba.ncols() != labels.len() {
        return None;
    }
    let n = truth.len() as f64;
    let mut total = 0.0;
    for (idx, &label) in labels.iter().enumerate() {
        let is_positive: Vec<bool> = truth.iter().map(|&t| t == label).collect();
        let support = is_positive.iter().filter(|&&p| p).count() as f64;
        let auc = binary_auc(&is_positive, &proba.column(idx).to_vec())?;
        total += auc * support / n;
    }
    Some(total)
}

/// Mann-Whitney AUC with average ranks for tied scores
fn binary_auc(is_positive: &[bool], scores: &[f64]) -> Option<f64> {
    if scores.iter().any(|s| !s.is_finite()) {
        return None;
    }
    let n_pos = is_positive.iter().filter(|&&p| p).count();
    let n_neg = is_positive.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if is_positive[idx] {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let u = rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0;
    Some(u / (n_pos * n_neg as f64))
}

/// R², MSE, MAE, RMSE and MSLE (negatives clamped to zero; omitted if not finite)
pub fn regression_metrics(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<RegressionMetrics> {
    check_lengths(y_true, y_pred)?;
    let n = y_true.len() as f64;

    let errors = y_true - y_pred;
    let mse = errors.mapv(|e| e * e).sum() / n;
    let mae = errors.mapv(f64::abs).sum() / n;

    let y_mean = y_true.sum() / n;
    let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
    let ss_res: f64 = errors.mapv(|e| e * e).sum();
    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };

    let msle = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(&t, &p)| ((1.0 + t.max(0.0)).ln() - (1.0 + p.max(0.0)).ln()).powi(2))
        .sum::<f64>()
        / n;

    Ok(RegressionMetrics {
        r2_score: r2,
        mean_squared_error: mse,
        mean_absolute_error: mae,
        root_mean_squared_error: mse.sqrt(),
        mean_squared_log_error: msle.is_finite().then_some(msle),
    })
}

/// Metrics for `problem`; probabilities are ignored for regression
pub fn compute_metrics(
    problem: ProblemType,
    y_true: &Array1<f64>,
    y_pred: &Array1<f64>,
    y_proba: Option<&Array2<f64>>,
) -> Result<Metrics> {
    match problem {
        ProblemType::Classification => classification_metrics(y_true, y_pred, y_proba).map(Metrics::Classification),
        ProblemType::Regression => regression_metrics(y_true, y_pred).map(Metrics::Regression),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classification_metrics() {
        let y_true = array![1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let y_pred = array![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0];

        let m = classification_metrics(&y_true, &y_pred, None).unwrap();
        assert!((m.accuracy - 0.75).abs() < 1e-12);
        // Both classes have p = r = 0.75
        assert!((m.precision - 0.75).abs() < 1e-12);
        assert!((m.f1_score - 0.75).abs() < 1e-12);
        assert!(m.roc_auc.is_none());
    }

    #[test]
    fn test_zero_division_counts_as_zero() {
        let y_true = array![0.0, 0.0, 1.0, 1.0];
        let y_pred = array![0.0, 0.0, 0.0, 0.0];

        let m = classification_metrics(&y_true, &y_pred, None).unwrap();
        // Class 1 is never predicted: precision 0 with weight 0.5
        assert!((m.precision - 0.25).abs() < 1e-12);
        assert!((m.recall - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_binary_roc_auc() {
        let y_true = array![0.0, 0.0, 1.0, 1.0];
        let y_pred = array![0.0, 1.0, 0.0, 1.0];
        let proba = array![[0.9, 0.1], [0.6, 0.4], [0.65, 0.35], [0.2, 0.8]];

        let m = classification_metrics(&y_true, &y_pred, Some(&proba)).unwrap();
        assert!((m.roc_auc.unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_multiclass_roc_auc_perfect() {
        let y_true = array![0.0, 1.0, 2.0, 2.0];
        let proba = array![[0.8, 0.1, 0.1], [0.1, 0.8, 0.1], [0.1, 0.1, 0.8], [0.2, 0.1, 0.7]];
        let m = classification_metrics(&y_true, &y_true, Some(&proba)).unwrap();
        assert!((m.roc_auc.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc_unavailable_for_single_class() {
        let y_true = array![1.0, 1.0];
        let proba = array![[0.2, 0.8], [0.4, 0.6]];
        let m = classification_metrics(&y_true, &y_true, Some(&proba)).unwrap();
        assert!(m.roc_auc.is_none());

        let json = serde_json::to_value(Metrics::Classification(m)).unwrap();
        assert!(json["rocAuc"].is_null());
    }

    #[test]
    fn test_regression_metrics() {
        let y_true = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y_pred = array![1.1, 2.0, 2.9, 4.1, 5.0];

        let m = regression_metrics(&y_true, &y_pred).unwrap();
        assert!((m.mean_squared_error - 0.006).abs() < 1e-12);
        assert!((m.root_mean_squared_error - 0.006f64.sqrt()).abs() < 1e-12);
        assert!(m.r2_score > 0.99);
        assert!(m.mean_squared_log_error.is_some());
    }

    #[test]
    fn test_msle_clamps_negatives() {
        let m = regression_metrics(&array![-1.0, 0.0], &array![-5.0, 0.0]).unwrap();
        assert_eq!(m.mean_squared_log_error, Some(0.0));
    }

    #[test]
    fn test_regression_keys_are_camel_case() {
        let m = regression_metrics(&array![1.0, 2.0], &array![1.0, 2.0]).unwrap();
        let json = serde_json::to_value(Metrics::Regression(m)).unwrap();
        assert_eq!(json["r2Score"], 1.0);
        assert!(json.get("rootMeanSquaredError").is_some());
    }

    #[test]
    fn test_untagged_roundtrip_picks_right_variant() {
        let m = Metrics::Regression(regression_metrics(&array![1.0, 2.0], &array![1.5, 2.0]).unwrap());
        let back: Metrics = serde_json::from_str(&serde_json::to_string(&m).unwrap()).unwrap();
        assert_eq!(back.problem_type(), ProblemType::Regression);
    }

    #[test]
    fn test_overflowing_errors_are_not_finite() {
        let y_true = array![1e200, 2e200, 3e200];
        let y_pred = array![-1e200, 4e200, 1e200];
        let m = Metrics::Regression(regression_metrics(&y_true, &y_pred).unwrap());
        assert!(!m.is_finite());

        let ok = Metrics::Regression(regression_metrics(&array![1.0, 2.0], &array![1.5, 2.0]).unwrap());
        assert!(ok.is_finite());
    }
}
