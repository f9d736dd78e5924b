//! Linear model implementations

use super::{argmax, check_shapes, class_labels, Estimator};
use crate::error::{BuilderError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve the symmetric positive-definite system Ax = b by Cholesky decomposition.
/// A near-singular matrix gets a small ridge added once before giving up.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }
    cholesky_factor(a)
        .or_else(|| {
            let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64;
            let mut a_reg = a.clone();
            for k in 0..n {
                a_reg[[k, k]] += ridge.max(1e-12);
            }
            cholesky_factor(&a_reg)
        })
        .map(|l| cholesky_substitute(&l, b))
}

/// Lower-triangular L with A = L * L^T, or `None` if A is not positive definite
fn cholesky_factor(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

fn cholesky_substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    // Forward substitution: L * y = b
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    x
}

/// Gauss-Jordan inverse, used when Cholesky fails
fn matrix_inverse(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return None;
    }

    let mut aug = Array2::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = m[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }

    for col in 0..n {
        let mut max_row = col;
        for row in col + 1..n {
            if aug[[row, col]].abs() > aug[[max_row, col]].abs() {
                max_row = row;
            }
        }
        if max_row != col {
            for j in 0..2 * n {
                aug.swap([col, j], [max_row, j]);
            }
        }
        if aug[[col, col]].abs() < 1e-10 {
            return None;
        }

        let pivot = aug[[col, col]];
        for j in 0..2 * n {
            aug[[col, j]] /= pivot;
        }
        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                for j in 0..2 * n {
                    aug[[row, j]] -= factor * aug[[col, j]];
                }
            }
        }
    }

    Some(aug.slice(ndarray::s![.., n..]).to_owned())
}

/// Solve (X^T X + alpha I) w = X^T y
fn solve_normal_equations(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Result<Array1<f64>> {
    let mut xtx = x.t().dot(x);
    if alpha > 0.0 {
        for i in 0..xtx.nrows() {
            xtx[[i, i]] += alpha;
        }
    }
    let xty = x.t().dot(y);

    if let Some(w) = cholesky_solve(&xtx, &xty) {
        return Ok(w);
    }
    matrix_inverse(&xtx)
        .map(|inv| inv.dot(&xty))
        .ok_or_else(|| BuilderError::Computation("Matrix is singular, cannot solve least squares".to_string()))
}

/// Centred copies of `x` and `y` plus the means that were removed
fn center(x: &Array2<f64>, y: &Array1<f64>) -> Result<(Array2<f64>, Array1<f64>, Array1<f64>, f64)> {
    let x_mean = x
        .mean_axis(Axis(0))
        .ok_or_else(|| BuilderError::Training("Cannot center an empty matrix".to_string()))?;
    let y_mean = y.mean().unwrap_or(0.0);
    let x_c = x - &x_mean.view().insert_axis(Axis(0));
    let y_c = y - y_mean;
    Ok((x_c, y_c, x_mean, y_mean))
}

fn linear_predict(coefficients: &Option<Array1<f64>>, intercept: f64, x: &Array2<f64>) -> Result<Array1<f64>> {
    let w = coefficients.as_ref().ok_or(BuilderError::ModelNotFitted)?;
    if x.ncols() != w.len() {
        return Err(BuilderError::ShapeError {
            expected: format!("{} features", w.len()),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(x.dot(w) + intercept)
}

/// Ordinary least squares
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinearRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Estimator for LinearRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        let (x_c, y_c, x_mean, y_mean) = center(x, y)?;
        let w = solve_normal_equations(&x_c, &y_c, 0.0)?;
        self.intercept = y_mean - w.dot(&x_mean);
        self.coefficients = Some(w);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        linear_predict(&self.coefficients, self.intercept, x)
    }
}

/// Ridge Regression (L2-regularized linear regression)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    /// L2 regularization strength
    pub alpha: f64,
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            alpha,
        }
    }
}

impl Estimator for RidgeRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        let (x_c, y_c, x_mean, y_mean) = center(x, y)?;
        let w = solve_normal_equations(&x_c, &y_c, self.alpha)?;
        self.intercept = y_mean - w.dot(&x_mean);
        self.coefficients = Some(w);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        linear_predict(&self.coefficients, self.intercept, x)
    }
}

/// Lasso Regression (L1-regularized via coordinate descent).
///
/// Minimises `1/(2n) ||y - Xw||^2 + alpha ||w||_1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LassoRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for LassoRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl LassoRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            alpha,
            max_iter: 1000,
            tol: 1e-6,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    fn soft_threshold(val: f64, threshold: f64) -> f64 {
        if val > threshold {
            val - threshold
        } else if val < -threshold {
            val + threshold
        } else {
            0.0
        }
    }
}

impl Estimator for LassoRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        let n_features = x.ncols();
        let (x_c, y_c, x_mean, y_mean) = center(x, y)?;

        let col_norms: Vec<f64> = (0..n_features)
            .map(|j| x_c.column(j).mapv(|v| v * v).sum())
            .collect();

        let mut w = Array1::zeros(n_features);
        let lambda = self.alpha * x.nrows() as f64;
        let mut r = y_c.clone();

        for _ in 0..self.max_iter {
            let mut max_delta = 0.0f64;
            for j in 0..n_features {
                if col_norms[j] < 1e-15 {
                    w[j] = 0.0;
                    continue;
                }
                let rho = x_c.column(j).dot(&r) + col_norms[j] * w[j];
                let old = w[j];
                w[j] = Self::soft_threshold(rho, lambda) / col_norms[j];
                let delta = old - w[j];
                if delta != 0.0 {
                    r.scaled_add(delta, &x_c.column(j));
                    max_delta = max_delta.max(delta.abs());
                }
            }
            if max_delta < self.tol {
                break;
            }
        }

        self.intercept = y_mean - w.dot(&x_mean);
        self.coefficients = Some(w);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        linear_predict(&self.coefficients, self.intercept, x)
    }
}

/// Multinomial logistic regression with L2 penalty, fit by gradient descent.
///
/// Binary problems use the same softmax formulation with two columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// n_features x n_classes
    pub coefficients: Option<Array2<f64>>,
    pub intercepts: Option<Array1<f64>>,
    /// Inverse regularization strength
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    classes: Vec<f64>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercepts: None,
            c: 1.0,
            max_iter: 1000,
            tol: 1e-6,
            classes: Vec::new(),
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    fn softmax_rows(mut logits: Array2<f64>) -> Array2<f64> {
        for mut row in logits.rows_mut() {
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            if sum > 0.0 {
                row.mapv_inplace(|v| v / sum);
            }
        }
        logits
    }

    fn probabilities(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let w = self.coefficients.as_ref().ok_or(BuilderError::ModelNotFitted)?;
        let b = self.intercepts.as_ref().ok_or(BuilderError::ModelNotFitted)?;
        if x.ncols() != w.nrows() {
            return Err(BuilderError::ShapeError {
                expected: format!("{} features", w.nrows()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(Self::softmax_rows(x.dot(w) + &b.view().insert_axis(Axis(0))))
    }
}

impl Estimator for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        let classes = class_labels(y);
        if classes.len() < 2 {
            return Err(BuilderError::Training(
                "Logistic regression needs at least two classes".to_string(),
            ));
        }

        let n = x.nrows();
        let n_features = x.ncols();
        let k = classes.len();

        let mut targets = Array2::<f64>::zeros((n, k));
        for (i, &label) in y.iter().enumerate() {
            if let Some(c) = classes.iter().position(|&c| c == label.round()) {
                targets[[i, c]] = 1.0;
            }
        }

        let l2 = 1.0 / (self.c * n as f64);
        // Step size from a bound on the softmax loss curvature
        let trace = x.mapv(|v| v * v).sum() / n as f64;
        let lr = 1.0 / (0.5 * (trace + 1.0) + l2);

        let mut w = Array2::<f64>::zeros((n_features, k));
        let mut b = Array1::<f64>::zeros(k);

        for _ in 0..self.max_iter {
            let probs = Self::softmax_rows(x.dot(&w) + &b.view().insert_axis(Axis(0)));
            let errors = probs - &targets;
            let dw = x.t().dot(&errors) / n as f64 + &(&w * l2);
            let db = errors
                .mean_axis(Axis(0))
                .ok_or_else(|| BuilderError::Computation("Empty gradient".to_string()))?;

            let grad_norm = (dw.mapv(|v| v * v).sum() + db.mapv(|v| v * v).sum()).sqrt();
            if !grad_norm.is_finite() {
                return Err(BuilderError::Training("Logistic regression diverged".to_string()));
            }
            if grad_norm < self.tol {
                break;
            }
            w.scaled_add(-lr, &dw);
            b.scaled_add(-lr, &db);
        }

        self.coefficients = Some(w);
        self.intercepts = Some(b);
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let probs = self.probabilities(x)?;
        Ok(probs
            .rows()
            .into_iter()
            .map(|row| self.classes[argmax(row.iter().copied())])
            .collect())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        self.probabilities(x).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_regression_recovers_line() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![3.0, 5.0, 7.0, 9.0, 11.0];

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        let w = model.coefficients.as_ref().unwrap();
        assert!((w[0] - 2.0).abs() < 1e-8);
        assert!((model.intercept - 1.0).abs() < 1e-8);
    }

    #[test]
    fn test_ridge_shrinks_coefficients() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];

        let mut ols = LinearRegression::new();
        ols.fit(&x, &y).unwrap();
        let mut ridge = RidgeRegression::new(1.0);
        ridge.fit(&x, &y).unwrap();

        let w_ols = ols.coefficients.as_ref().unwrap()[0];
        let w_ridge = ridge.coefficients.as_ref().unwrap()[0];
        assert!(w_ridge < w_ols);
        assert!(w_ridge > 0.0);
    }

    #[test]
    fn test_lasso_zeroes_irrelevant_feature() {
        let x = array![[1.0, 0.1], [2.0, -0.1], [3.0, 0.1], [4.0, -0.1], [5.0, 0.1]];
        let y = array![10.0, 20.0, 30.0, 40.0, 50.0];

        let mut lasso = LassoRegression::new(1.0);
        lasso.fit(&x, &y).unwrap();
        let w = lasso.coefficients.as_ref().unwrap();
        assert!(w[0] > 5.0);
        assert_eq!(w[1], 0.0);
    }

    #[test]
    fn test_logistic_binary() {
        let x = array![[-2.0], [-1.5], [-1.0], [1.0], [1.5], [2.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);

        let proba = model.predict_proba(&x).unwrap().unwrap();
        assert_eq!(proba.ncols(), 2);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_logistic_multiclass() {
        let x = array![
            [0.0, 0.0], [0.2, 0.1], [5.0, 5.0], [5.2, 4.9], [0.0, 5.0], [0.1, 5.2]
        ];
        let y = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];

        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
        assert_eq!(model.predict_proba(&x).unwrap().unwrap().ncols(), 3);
    }

    #[test]
    fn test_logistic_single_class_fails() {
        let mut model = LogisticRegression::new();
        assert!(model.fit(&array![[1.0], [2.0]], &array![1.0, 1.0]).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LinearRegression::new();
        assert!(matches!(model.predict(&array![[1.0]]), Err(BuilderError::ModelNotFitted)));
    }
}
