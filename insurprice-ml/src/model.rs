//! Least-squares regression, regression metrics, and the persisted
//! insurance price model bundle.

use crate::data::RecordBatch;
use crate::encoder::{EncodeError, FeatureEncoder, numeric_column};
use chrono::{DateTime, Utc};
use insurprice_core::Hyperparameters;
use insurprice_core::persistence::{read_binary, write_binary};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum FitError {
    #[error("no training rows")]
    Empty,

    #[error("features have {rows} rows but the target has {targets} values")]
    Shape { rows: usize, targets: usize },

    #[error("training data contains NaN or infinite values")]
    NonFinite,

    #[error("normal equations are singular even after regularization")]
    Singular,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("model expects {expected} features, input has {actual}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("no rows to score")]
    Empty,
}

// ---------------------------------------------------------------------------
// Linear solver
// ---------------------------------------------------------------------------

/// Pivots at or below this fraction of the largest diagonal entry count as zero.
const PIVOT_TOLERANCE: f64 = 1e-10;

/// Solve the symmetric positive-definite system `a x = b` by Cholesky
/// factorization. `None` when `a` is not numerically positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }
    let max_diag = a.diag().iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let floor = PIVOT_TOLERANCE * max_diag.max(f64::MIN_POSITIVE);

    // A = L * L^T
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag.is_nan() || diag <= floor {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L * y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T * x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Cholesky solve with one jittered retry for rank-deficient systems, such as
/// one-hot blocks that always sum to one.
fn solve_normal_equations(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    if let Some(x) = cholesky_solve(a, b) {
        return Some(x);
    }
    let n = a.nrows();
    if n == 0 {
        return None;
    }
    let mean_diag = a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
    let jitter = (1e-8 * mean_diag).max(1e-12);
    tracing::debug!(jitter, "normal equations not positive definite, retrying with jitter");
    let mut regularized = a.clone();
    for k in 0..n {
        regularized[[k, k]] += jitter;
    }
    cholesky_solve(&regularized, b)
}

// ---------------------------------------------------------------------------
// LinearRegression
// ---------------------------------------------------------------------------

/// Ordinary least squares, or ridge when `alpha > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    pub coefficients: Array1<f64>,
    pub intercept: f64,
    pub fit_intercept: bool,
    pub alpha: f64,
}

impl LinearRegression {
    pub fn fit(
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &Hyperparameters,
    ) -> Result<Self, FitError> {
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 {
            return Err(FitError::Empty);
        }
        if n_samples != y.len() {
            return Err(FitError::Shape {
                rows: n_samples,
                targets: y.len(),
            });
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(FitError::NonFinite);
        }

        // Center data if fitting intercept
        let (x_centered, y_centered, x_mean, y_mean) = if params.fit_intercept {
            let x_mean = x.mean_axis(Axis(0)).ok_or(FitError::Empty)?;
            let y_mean = y.mean().ok_or(FitError::Empty)?;
            let x_centered = x - &x_mean.clone().insert_axis(Axis(0));
            let y_centered = y - y_mean;
            (x_centered, y_centered, x_mean, y_mean)
        } else {
            (x.clone(), y.clone(), Array1::zeros(n_features), 0.0)
        };

        // (X^T X + alpha*I) w = X^T y
        let mut xtx = x_centered.t().dot(&x_centered);
        for i in 0..n_features {
            xtx[[i, i]] += params.alpha;
        }
        let xty = x_centered.t().dot(&y_centered);

        let coefficients = if n_features == 0 {
            Array1::zeros(0)
        } else {
            solve_normal_equations(&xtx, &xty).ok_or(FitError::Singular)?
        };
        if coefficients.iter().any(|v| !v.is_finite()) {
            return Err(FitError::Singular);
        }

        let intercept = if params.fit_intercept {
            y_mean - coefficients.dot(&x_mean)
        } else {
            0.0
        };

        Ok(Self {
            coefficients,
            intercept,
            fit_intercept: params.fit_intercept,
            alpha: params.alpha,
        })
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        if x.ncols() != self.n_features() {
            return Err(ModelError::FeatureCount {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        Ok(x.dot(&self.coefficients) + self.intercept)
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Regression metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r_squared: f64,
    pub explained_variance: Option<f64>,
}

impl RegressionMetrics {
    /// `None` when the inputs are empty or of different lengths.
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Option<Self> {
        let r_squared = r2_score(y_true, y_pred)?;
        let n = y_true.len() as f64;
        let residuals = y_true - y_pred;
        let mse = residuals.mapv(|r| r * r).sum() / n;
        let mae = residuals.mapv(f64::abs).sum() / n;

        let mean_residual = residuals.sum() / n;
        let residual_var = residuals.mapv(|r| (r - mean_residual).powi(2)).sum() / n;
        let y_mean = y_true.sum() / n;
        let y_var = y_true.mapv(|v| (v - y_mean).powi(2)).sum() / n;
        let explained_variance = (y_var > 0.0).then(|| 1.0 - residual_var / y_var);

        Some(Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r_squared,
            explained_variance,
        })
    }
}

/// Coefficient of determination.
///
/// For a constant target the score is 1.0 on a perfect fit and 0.0 otherwise.
/// `None` when the inputs are empty or of different lengths.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Option<f64> {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return None;
    }
    let y_mean = y_true.mean()?;
    let ss_res = (y_true - y_pred).mapv(|v| v * v).sum();
    let ss_tot = y_true.mapv(|v| (v - y_mean) * (v - y_mean)).sum();
    if ss_tot == 0.0 {
        return Some(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Some(1.0 - ss_res / ss_tot)
}

// ---------------------------------------------------------------------------
// InsurancePriceModel
// ---------------------------------------------------------------------------

/// The persisted, published and served model: the fitted encoder together
/// with the regressor, so raw records can be scored directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsurancePriceModel {
    pub encoder: FeatureEncoder,
    pub regressor: LinearRegression,
    pub feature_names: Vec<String>,
    pub target_column: String,
    pub trained_at: DateTime<Utc>,
}

impl InsurancePriceModel {
    pub fn new(encoder: FeatureEncoder, regressor: LinearRegression, target_column: String) -> Self {
        let feature_names = encoder.feature_names();
        Self {
            encoder,
            regressor,
            feature_names,
            target_column,
            trained_at: Utc::now(),
        }
    }

    /// Predict from raw records. Extra columns, including the target, are ignored.
    pub fn predict(&self, batch: &RecordBatch) -> Result<Array1<f64>, ModelError> {
        let x = self.encoder.transform(batch)?;
        self.regressor.predict(&x)
    }

    /// R² of this model on raw records that carry the target column.
    pub fn score(&self, batch: &RecordBatch) -> Result<f64, ModelError> {
        let y_true = numeric_column(batch, &self.target_column)?;
        let y_pred = self.predict(batch)?;
        r2_score(&y_true, &y_pred).ok_or(ModelError::Empty)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        write_binary(path, self)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        read_binary(path)
    }
}
