//! Gaussian Naive Bayes for continuous features

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::{argmax, check_shapes, class_labels, Estimator};
use crate::error::{BuilderError, Result};

/// Per-class Gaussian statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassStats {
    code: usize,
    log_prior: f64,
    means: Vec<f64>,
    variances: Vec<f64>,
}

/// Gaussian Naive Bayes Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    stats: Vec<ClassStats>,
    n_classes: usize,
    n_features: usize,
    /// Fraction of the largest feature variance added to every variance
    var_smoothing: f64,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            stats: Vec::new(),
            n_classes: 0,
            n_features: 0,
            var_smoothing: 1e-9,
        }
    }

    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    fn joint_log_likelihood(&self, row: ArrayView1<f64>, stats: &ClassStats) -> f64 {
        let log_likelihood: f64 = row
            .iter()
            .zip(stats.means.iter())
            .zip(stats.variances.iter())
            .map(|((&xi, &mean), &var)| -0.5 * ((xi - mean).powi(2) / var + var.ln() + (2.0 * PI).ln()))
            .sum();
        stats.log_prior + log_likelihood
    }

    /// Normalised log probabilities over the classes seen in training
    fn predict_log_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.stats.is_empty() {
            return Err(BuilderError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(BuilderError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut log_probs = Array2::zeros((x.nrows(), self.stats.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (j, stats) in self.stats.iter().enumerate() {
                log_probs[[i, j]] = self.joint_log_likelihood(row, stats);
            }
        }

        // Log-sum-exp normalisation
        for mut row in log_probs.rows_mut() {
            let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let log_sum = row.iter().map(|&v| (v - max_val).exp()).sum::<f64>().ln();
            row.mapv_inplace(|v| v - max_val - log_sum);
        }
        Ok(log_probs)
    }
}

impl Estimator for GaussianNaiveBayes {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        let n_samples = x.nrows();
        self.n_features = x.ncols();

        let epsilon = self.var_smoothing
            * x.var_axis(Axis(0), 0.0).iter().cloned().fold(0.0f64, f64::max);

        let classes = class_labels(y);
        self.n_classes = classes.last().map_or(0, |&c| c as usize + 1);
        self.stats = classes
            .iter()
            .map(|&class| {
                let rows: Vec<usize> = (0..n_samples).filter(|&i| y[i].round() == class).collect();

                // Single-pass Welford's algorithm for mean and variance
                let mut means = vec![0.0; self.n_features];
                let mut m2 = vec![0.0; self.n_features];
                for (count, &idx) in rows.iter().enumerate() {
                    for (j, &val) in x.row(idx).iter().enumerate() {
                        let delta = val - means[j];
                        means[j] += delta / (count + 1) as f64;
                        m2[j] += delta * (val - means[j]);
                    }
                }
                let n_class = rows.len() as f64;
                let variances = m2
                    .iter()
                    .map(|&m| (m / n_class + epsilon).max(f64::MIN_POSITIVE))
                    .collect();

                ClassStats {
                    code: class as usize,
                    log_prior: (n_class / n_samples as f64).ln(),
                    means,
                    variances,
                }
            })
            .collect();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let log_probs = self.predict_log_proba(x)?;
        Ok(log_probs
            .rows()
            .into_iter()
            .map(|row| self.stats[argmax(row.iter().copied())].code as f64)
            .collect())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        let log_probs = self.predict_log_proba(x)?;
        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for (j, stats) in self.stats.iter().enumerate() {
            proba.column_mut(stats.code).assign(&log_probs.column(j).mapv(f64::exp));
        }
        Ok(Some(proba))
    }
}
