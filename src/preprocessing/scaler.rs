//! Feature standardization

use crate::error::{BuilderError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Standard scaler: (x - mean) / std, fit column-wise.
///
/// Uses the population standard deviation; a constant column scales by 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Fit on a feature matrix
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(BuilderError::Validation(
                "No data available for scaling. Please check your input columns.".to_string(),
            ));
        }

        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| BuilderError::Computation("Cannot compute column means".to_string()))?;
        let scale = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });

        Ok(Self { mean, scale })
    }

    /// Fit and transform in one step
    pub fn fit_transform(x: &Array2<f64>) -> Result<(Self, Array2<f64>)> {
        let scaler = Self::fit(x)?;
        let scaled = scaler.transform(x)?;
        Ok((scaler, scaled))
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Transform a matrix with the fitted parameters
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(BuilderError::ShapeError {
                expected: format!("{} features", self.n_features()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok((x - &self.mean.view().insert_axis(Axis(0))) / &self.scale.view().insert_axis(Axis(0)))
    }

    /// Transform a single row
    pub fn transform_row(&self, row: ArrayView1<f64>) -> Result<Array1<f64>> {
        if row.len() != self.n_features() {
            return Err(BuilderError::ShapeError {
                expected: format!("{} features", self.n_features()),
                actual: format!("{} features", row.len()),
            });
        }
        Ok((&row - &self.mean) / &self.scale)
    }
}
