//! Support Vector Machine implementations
//!
//! The classifier trains one binary SMO problem per class (one-vs-rest, or a
//! single problem for two classes) and calibrates decision values into
//! probabilities with Platt scaling. The regressor solves the epsilon-SVR dual
//! by coordinate descent with the bias folded into the kernel.

use crate::error::{BuilderError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{argmax, check_shapes, class_labels, Estimator};

/// Maximum number of samples for eager kernel matrix computation
const MAX_KERNEL_MATRIX_SAMPLES: usize = 5_000;

/// RBF width
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Gamma {
    /// 1 / (n_features * Var(X))
    #[default]
    Scale,
    Value(f64),
}

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    pub gamma: Gamma,
    /// Tolerance for stopping criterion
    pub tol: f64,
    /// Maximum number of passes over the data
    pub max_iter: usize,
    pub random_state: u64,
    /// Epsilon for regression (SVR tube width)
    pub epsilon: f64,
    /// Fit Platt scaling for class probabilities
    pub probability: bool,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            gamma: Gamma::Scale,
            tol: 1e-3,
            max_iter: 1000,
            random_state: 42,
            epsilon: 0.1,
            probability: true,
        }
    }
}

/// RBF kernel, K(x, y) = exp(-γ ||x - y||²), with gamma resolved against the training data
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Kernel {
    gamma: f64,
}

impl Kernel {
    fn resolve(config: &SVMConfig, x: &Array2<f64>) -> Self {
        let gamma = match config.gamma {
            Gamma::Value(g) => g,
            Gamma::Scale => {
                let var = x.var(0.0);
                if var > 0.0 && x.ncols() > 0 {
                    1.0 / (x.ncols() as f64 * var)
                } else {
                    1.0
                }
            }
        };
        Self { gamma }
    }

    fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let norm_sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
        (-self.gamma * norm_sq).exp()
    }

    fn matrix(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let n = x.nrows();
        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(BuilderError::Training(format!(
                "Dataset has {} samples, exceeding the maximum {} for the SVM kernel matrix",
                n, MAX_KERNEL_MATRIX_SAMPLES
            )));
        }
        let values: Vec<f64> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| (0..n).map(move |j| self.eval(x.row(i), x.row(j))))
            .collect();
        Ok(Array2::from_shape_vec((n, n), values)?)
    }
}

fn check_width(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(BuilderError::ShapeError {
            expected: format!("{} features", expected),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

/// Working state for one binary SMO problem, labels in {-1, +1}
struct Smo<'a> {
    k: &'a Array2<f64>,
    y: &'a Array1<f64>,
    c: f64,
    alphas: Array1<f64>,
    /// f(x_i) - y_i for every training row
    errors: Array1<f64>,
    bias: f64,
}

impl<'a> Smo<'a> {
    fn new(k: &'a Array2<f64>, y: &'a Array1<f64>, c: f64) -> Self {
        Self {
            k,
            y,
            c,
            alphas: Array1::zeros(y.len()),
            errors: -y,
            bias: 0.0,
        }
    }

    fn violates_kkt(&self, i: usize, tol: f64) -> bool {
        let r = self.y[i] * self.errors[i];
        (r < -tol && self.alphas[i] < self.c) || (r > tol && self.alphas[i] > 0.0)
    }

    /// Second index maximising |E_i - E_j|
    fn second_choice(&self, i: usize) -> usize {
        let e_i = self.errors[i];
        let mut best = if i == 0 { 1 } else { 0 };
        let mut best_gap = -1.0;
        for j in 0..self.y.len() {
            if j == i {
                continue;
            }
            let gap = (e_i - self.errors[j]).abs();
            if gap > best_gap {
                best_gap = gap;
                best = j;
            }
        }
        best
    }

    fn take_step(&mut self, i: usize, j: usize) -> bool {
        let (k, y, c) = (self.k, self.y, self.c);
        let (e_i, e_j) = (self.errors[i], self.errors[j]);
        let (alpha_i_old, alpha_j_old) = (self.alphas[i], self.alphas[j]);

        let (l, h) = if y[i] != y[j] {
            ((alpha_j_old - alpha_i_old).max(0.0), (c + alpha_j_old - alpha_i_old).min(c))
        } else {
            ((alpha_i_old + alpha_j_old - c).max(0.0), (alpha_i_old + alpha_j_old).min(c))
        };
        if (l - h).abs() < 1e-10 {
            return false;
        }

        let eta = 2.0 * k[[i, j]] - k[[i, i]] - k[[j, j]];
        if eta >= 0.0 {
            return false;
        }

        let alpha_j = (alpha_j_old - y[j] * (e_i - e_j) / eta).clamp(l, h);
        if (alpha_j - alpha_j_old).abs() < 1e-5 {
            return false;
        }
        let alpha_i = alpha_i_old + y[i] * y[j] * (alpha_j_old - alpha_j);

        let d_i = y[i] * (alpha_i - alpha_i_old);
        let d_j = y[j] * (alpha_j - alpha_j_old);
        let b1 = self.bias - e_i - d_i * k[[i, i]] - d_j * k[[i, j]];
        let b2 = self.bias - e_j - d_i * k[[i, j]] - d_j * k[[j, j]];
        let new_bias = if alpha_i > 0.0 && alpha_i < c {
            b1
        } else if alpha_j > 0.0 && alpha_j < c {
            b2
        } else {
            (b1 + b2) / 2.0
        };

        let d_b = new_bias - self.bias;
        for m in 0..y.len() {
            self.errors[m] += d_i * k[[i, m]] + d_j * k[[j, m]] + d_b;
        }
        self.alphas[i] = alpha_i;
        self.alphas[j] = alpha_j;
        self.bias = new_bias;
        true
    }

    fn run(mut self, tol: f64, max_iter: usize, rng: &mut Xoshiro256PlusPlus) -> (Array1<f64>, f64) {
        let n = self.y.len();
        let max_passes = 5;
        let mut passes = 0;
        let mut iter = 0;

        while n > 1 && passes < max_passes && iter < max_iter {
            let mut num_changed = 0;
            for i in 0..n {
                if !self.violates_kkt(i, tol) {
                    continue;
                }
                let j = self.second_choice(i);
                if self.take_step(i, j) {
                    num_changed += 1;
                    continue;
                }
                // Fall back to a random partner
                let j = loop {
                    let j = rng.gen_range(0..n);
                    if j != i {
                        break j;
                    }
                };
                if self.take_step(i, j) {
                    num_changed += 1;
                }
            }
            iter += 1;
            passes = if num_changed == 0 { passes + 1 } else { 0 };
        }
        (self.alphas, self.bias)
    }
}

/// Fit sigmoid parameters (A, B) so that P(y=1|f) = 1 / (1 + exp(A f + B)).
/// Newton's method with backtracking on regularised targets.
fn platt_scale(decisions: &[f64], positive: &[bool]) -> (f64, f64) {
    let prior1 = positive.iter().filter(|&&p| p).count() as f64;
    let prior0 = positive.len() as f64 - prior1;
    let hi = (prior1 + 1.0) / (prior1 + 2.0);
    let lo = 1.0 / (prior0 + 2.0);
    let targets: Vec<f64> = positive.iter().map(|&p| if p { hi } else { lo }).collect();

    let objective = |a: f64, b: f64| -> f64 {
        decisions
            .iter()
            .zip(&targets)
            .map(|(&f, &t)| {
                let z = f * a + b;
                if z >= 0.0 {
                    t * z + (1.0 + (-z).exp()).ln()
                } else {
                    (t - 1.0) * z + (1.0 + z.exp()).ln()
                }
            })
            .sum()
    };

    let mut a = 0.0;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);

    for _ in 0..100 {
        let (mut h11, mut h22, mut h21, mut g1, mut g2) = (1e-12, 1e-12, 0.0, 0.0, 0.0);
        for (&f, &t) in decisions.iter().zip(&targets) {
            let z = f * a + b;
            let (p, q) = if z >= 0.0 {
                let e = (-z).exp();
                (e / (1.0 + e), 1.0 / (1.0 + e))
            } else {
                let e = z.exp();
                (1.0 / (1.0 + e), e / (1.0 + e))
            };
            let d2 = p * q;
            h11 += f * f * d2;
            h22 += d2;
            h21 += f * d2;
            let d1 = t - p;
            g1 += f * d1;
            g2 += d1;
        }
        if g1.abs() < 1e-5 && g2.abs() < 1e-5 {
            break;
        }

        let det = h11 * h22 - h21 * h21;
        let d_a = -(h22 * g1 - h21 * g2) / det;
        let d_b = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * d_a + g2 * d_b;

        let mut step = 1.0;
        while step >= 1e-10 {
            let (new_a, new_b) = (a + step * d_a, b + step * d_b);
            let new_f = objective(new_a, new_b);
            if new_f < fval + 1e-4 * step * gd {
                a = new_a;
                b = new_b;
                fval = new_f;
                break;
            }
            step /= 2.0;
        }
        if step < 1e-10 {
            break;
        }
    }
    (a, b)
}

fn sigmoid_probability(decision: f64, a: f64, b: f64) -> f64 {
    let z = decision * a + b;
    if z >= 0.0 {
        (-z).exp() / (1.0 + (-z).exp())
    } else {
        1.0 / (1.0 + z.exp())
    }
}

/// A single binary SVM (positive class vs the rest)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySVM {
    support_vectors: Array2<f64>,
    /// alpha_i * y_i for each support vector
    coefficients: Array1<f64>,
    bias: f64,
    platt: Option<(f64, f64)>,
}

impl BinarySVM {
    fn train(
        x: &Array2<f64>,
        k: &Array2<f64>,
        y_signed: &Array1<f64>,
        config: &SVMConfig,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Self {
        let (alphas, bias) = Smo::new(k, y_signed, config.c).run(config.tol, config.max_iter, rng);

        let support: Vec<usize> = (0..alphas.len()).filter(|&i| alphas[i] > 1e-8).collect();
        let support_vectors = x.select(ndarray::Axis(0), &support);
        let coefficients: Array1<f64> = support.iter().map(|&i| alphas[i] * y_signed[i]).collect();

        let mut model = Self {
            support_vectors,
            coefficients,
            bias,
            platt: None,
        };

        if config.probability {
            // Training decision values straight from the kernel matrix
            let decisions: Vec<f64> = (0..x.nrows())
                .map(|row| support.iter().zip(model.coefficients.iter()).map(|(&s, &c)| c * k[[s, row]]).sum::<f64>() + bias)
                .collect();
            let positive: Vec<bool> = y_signed.iter().map(|&v| v > 0.0).collect();
            model.platt = Some(platt_scale(&decisions, &positive));
        }
        model
    }

    fn decision(&self, kernel: &Kernel, sample: ArrayView1<f64>) -> f64 {
        self.support_vectors
            .rows()
            .into_iter()
            .zip(self.coefficients.iter())
            .map(|(sv, &coef)| coef * kernel.eval(sample, sv))
            .sum::<f64>()
            + self.bias
    }
}

/// Support Vector Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    config: SVMConfig,
    kernel: Option<Kernel>,
    /// Class codes seen in training, ascending
    classes: Vec<usize>,
    /// One machine for two classes (positive = classes[1]); one per class otherwise
    machines: Vec<BinarySVM>,
    n_features: usize,
    n_classes: usize,
}

impl Default for SVMClassifier {
    fn default() -> Self {
        Self::new(SVMConfig::default())
    }
}

impl SVMClassifier {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            kernel: None,
            classes: Vec::new(),
            machines: Vec::new(),
            n_features: 0,
            n_classes: 0,
        }
    }

    /// Raw decision values, one column per machine
    fn decision_matrix(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let kernel = self.kernel.as_ref().ok_or(BuilderError::ModelNotFitted)?;
        check_width(self.n_features, x)?;
        let rows: Vec<f64> = x
            .rows()
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .flat_map_iter(|row| self.machines.iter().map(move |m| m.decision(kernel, row)))
            .collect();
        Ok(Array2::from_shape_vec((x.nrows(), self.machines.len()), rows)?)
    }

    pub fn n_support_vectors(&self) -> usize {
        self.machines.iter().map(|m| m.support_vectors.nrows()).sum()
    }
}

impl Estimator for SVMClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        let classes: Vec<usize> = class_labels(y).into_iter().map(|c| c as usize).collect();
        if classes.len() < 2 {
            return Err(BuilderError::Training("SVM requires at least 2 distinct classes".to_string()));
        }

        let kernel = Kernel::resolve(&self.config, x);
        let k = kernel.matrix(x)?;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);

        let positives: Vec<usize> = if classes.len() == 2 {
            vec![classes[1]]
        } else {
            classes.clone()
        };
        self.machines = positives
            .iter()
            .map(|&positive| {
                let y_signed = y.mapv(|v| if v.round() as usize == positive { 1.0 } else { -1.0 });
                BinarySVM::train(x, &k, &y_signed, &self.config, &mut rng)
            })
            .collect();

        self.n_classes = classes[classes.len() - 1] + 1;
        self.classes = classes;
        self.n_features = x.ncols();
        self.kernel = Some(kernel);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let decisions = self.decision_matrix(x)?;
        Ok(decisions
            .rows()
            .into_iter()
            .map(|row| {
                let class = if self.machines.len() == 1 {
                    if row[0] >= 0.0 {
                        self.classes[1]
                    } else {
                        self.classes[0]
                    }
                } else {
                    self.classes[argmax(row.iter().copied())]
                };
                class as f64
            })
            .collect())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        if !self.config.probability {
            return Ok(None);
        }
        let decisions = self.decision_matrix(x)?;
        let mut proba = Array2::zeros((x.nrows(), self.n_classes));

        for (i, row) in decisions.rows().into_iter().enumerate() {
            let scores: Vec<f64> = row
                .iter()
                .zip(&self.machines)
                .map(|(&d, m)| m.platt.map_or(0.5, |(a, b)| sigmoid_probability(d, a, b)))
                .collect();

            if self.machines.len() == 1 {
                proba[[i, self.classes[0]]] = 1.0 - scores[0];
                proba[[i, self.classes[1]]] = scores[0];
            } else {
                let total: f64 = scores.iter().sum();
                for (c, &s) in self.classes.iter().zip(&scores) {
                    proba[[i, *c]] = if total > 0.0 { s / total } else { 1.0 / scores.len() as f64 };
                }
            }
        }
        Ok(Some(proba))
    }
}

/// Support Vector Regressor (epsilon-insensitive loss)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMRegressor {
    config: SVMConfig,
    kernel: Option<Kernel>,
    support_vectors: Array2<f64>,
    /// alpha - alpha* for each support vector
    coefficients: Array1<f64>,
    bias: f64,
}

impl Default for SVMRegressor {
    fn default() -> Self {
        Self::new(SVMConfig::default())
    }
}

impl SVMRegressor {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            kernel: None,
            support_vectors: Array2::zeros((0, 0)),
            coefficients: Array1::zeros(0),
            bias: 0.0,
        }
    }

    pub fn n_support_vectors(&self) -> usize {
        self.support_vectors.nrows()
    }
}

impl Estimator for SVMRegressor {
    /// Dual coordinate descent on beta = alpha - alpha*, |beta| <= C, with
    /// Q = K + 1 so the bias equals sum(beta).
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        let n = x.nrows();
        let kernel = Kernel::resolve(&self.config, x);
        let q = kernel.matrix(x)? + 1.0;
        let (c, eps) = (self.config.c, self.config.epsilon);

        let mut beta = Array1::<f64>::zeros(n);
        // q · beta, kept in sync with every coordinate update
        let mut fitted = Array1::<f64>::zeros(n);

        for _ in 0..self.config.max_iter {
            let mut max_change = 0.0f64;
            for i in 0..n {
                let q_ii = q[[i, i]];
                let rho = y[i] - fitted[i] + q_ii * beta[i];
                let shrunk = if rho > eps {
                    rho - eps
                } else if rho < -eps {
                    rho + eps
                } else {
                    0.0
                };
                let new_beta = (shrunk / q_ii).clamp(-c, c);
                let delta = new_beta - beta[i];
                if delta != 0.0 {
                    fitted.scaled_add(delta, &q.row(i));
                    beta[i] = new_beta;
                    max_change = max_change.max(delta.abs());
                }
            }
            if max_change < self.config.tol {
                break;
            }
        }

        let support: Vec<usize> = (0..n).filter(|&i| beta[i].abs() > 1e-8).collect();
        self.support_vectors = x.select(ndarray::Axis(0), &support);
        self.coefficients = support.iter().map(|&i| beta[i]).collect();
        self.bias = beta.sum();
        self.kernel = Some(kernel);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let kernel = self.kernel.as_ref().ok_or(BuilderError::ModelNotFitted)?;
        if self.support_vectors.nrows() > 0 {
            check_width(self.support_vectors.ncols(), x)?;
        }
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                self.support_vectors
                    .rows()
                    .into_iter()
                    .zip(self.coefficients.iter())
                    .map(|(sv, &coef)| coef * kernel.eval(row, sv))
                    .sum::<f64>()
                    + self.bias
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_linear_separable_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec(
            (10, 2),
            vec![
                1.0, 1.0, 1.5, 1.2, 2.0, 2.0, 1.2, 1.8, 0.8, 1.5, 5.0, 5.0, 5.5, 5.2, 6.0, 6.0, 5.2, 5.8, 4.8, 5.5,
            ],
        )
        .unwrap();
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        (x, y)
    }

    fn accuracy(y: &Array1<f64>, p: &Array1<f64>) -> f64 {
        y.iter().zip(p.iter()).filter(|(a, b)| a == b).count() as f64 / y.len() as f64
    }

    #[test]
    fn test_svm_classifier_separable() {
        let (x, y) = create_linear_separable_data();
        let mut svm = SVMClassifier::default();
        svm.fit(&x, &y).unwrap();
        assert!(accuracy(&y, &svm.predict(&x).unwrap()) > 0.8);
        assert!(svm.n_support_vectors() > 0);
    }

    #[test]
    fn test_svm_classifier_rbf_probabilities() {
        let (x, y) = create_linear_separable_data();
        let mut svm = SVMClassifier::default();
        svm.fit(&x, &y).unwrap();

        let proba = svm.predict_proba(&x).unwrap().unwrap();
        assert_eq!(proba.dim(), (10, 2));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        // Positive rows lean positive
        assert!(proba[[9, 1]] > proba[[0, 1]]);
    }

    #[test]
    fn test_svm_classifier_multiclass() {
        let x = Array2::from_shape_vec(
            (15, 2),
            vec![
                1.0, 1.0, 1.5, 1.2, 2.0, 2.0, 1.2, 1.8, 0.8, 1.5, 5.0, 5.0, 5.5, 5.2, 6.0, 6.0, 5.2, 5.8, 4.8, 5.5,
                1.0, 5.0, 1.5, 5.2, 2.0, 6.0, 1.2, 5.8, 0.8, 5.5,
            ],
        )
        .unwrap();
        let y = Array1::from_vec(vec![
            0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 2.0,
        ]);

        let config = SVMConfig {
            c: 10.0,
            ..Default::default()
        };
        let mut svm = SVMClassifier::new(config);
        svm.fit(&x, &y).unwrap();

        let predictions = svm.predict(&x).unwrap();
        assert!(accuracy(&y, &predictions) > 0.8);
        assert_eq!(svm.predict_proba(&x).unwrap().unwrap().ncols(), 3);
    }

    #[test]
    fn test_single_class_is_rejected() {
        let mut svm = SVMClassifier::default();
        assert!(svm.fit(&array![[1.0], [2.0]], &array![0.0, 0.0]).is_err());
    }

    #[test]
    fn test_platt_scale_is_monotone() {
        let decisions = [-2.0, -1.5, -1.0, -0.2, 0.3, 1.0, 1.4, 2.2];
        let positive = [false, false, false, false, true, true, true, true];
        let (a, b) = platt_scale(&decisions, &positive);
        assert!(a < 0.0);
        assert!(sigmoid_probability(2.0, a, b) > sigmoid_probability(-2.0, a, b));
    }

    #[test]
    fn test_svm_regressor_follows_trend() {
        let x = Array2::from_shape_vec((10, 1), (1..=10).map(|v| v as f64).collect()).unwrap();
        let y = x.column(0).mapv(|v| 0.2 * v);

        let config = SVMConfig {
            c: 10.0,
            epsilon: 0.05,
            ..Default::default()
        };
        let mut svr = SVMRegressor::new(config);
        svr.fit(&x, &y).unwrap();

        let predictions = svr.predict(&x).unwrap();
        for (pred, actual) in predictions.iter().zip(y.iter()) {
            assert!((pred - actual).abs() < 0.3, "pred={}, actual={}", pred, actual);
        }
    }

    #[test]
    fn test_svm_regressor_has_no_probabilities() {
        let mut svr = SVMRegressor::default();
        svr.fit(&array![[0.0], [1.0], [2.0]], &array![0.0, 1.0, 2.0]).unwrap();
        assert!(svr.predict_proba(&array![[1.0]]).unwrap().is_none());
    }
}
