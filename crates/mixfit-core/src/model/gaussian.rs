// =============================================================================
// Multivariate Gaussian Component
// =============================================================================
//
// One component of the mixture: a mean vector and a symmetric covariance
// matrix over D dimensions.
//
// DENSITY EVALUATION
// ------------------
// The log-density of a point x is
//
//     log N(x; mu, S) = -1/2 (D log 2pi + log|S| + (x-mu)' S^-1 (x-mu))
//
// We never form S^-1 explicitly. A single Cholesky factorization S = L L'
// gives the log-determinant (twice the log of the factor's diagonal) and the
// Mahalanobis term via a triangular solve. `log_density_batch` factors once
// and reuses the factor for every point, which is what the E-step needs.
//
// A failed factorization means the covariance is not positive definite and
// therefore not usable as a density; this surfaces as a Numerical error so
// the caller (one EM trial) can abort cleanly.
//
// =============================================================================

use nalgebra::{Cholesky, DVector, Dyn};
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::convert::{to_dmatrix, to_dvector};
use crate::error::{MixFitError, Result};

/// A single multivariate Gaussian distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gaussian {
    mean: Array1<f64>,
    covariance: Array2<f64>,
}

impl Gaussian {
    /// Create a Gaussian with the given mean and identity covariance.
    pub fn standard(dimensionality: usize) -> Self {
        Self {
            mean: Array1::zeros(dimensionality),
            covariance: Array2::eye(dimensionality),
        }
    }

    /// Create a Gaussian from explicit parameters.
    ///
    /// Validates that the covariance is square, matches the mean's
    /// dimensionality, and is symmetric.
    pub fn new(mean: Array1<f64>, covariance: Array2<f64>) -> Result<Self> {
        let candidate = Self { mean, covariance };
        candidate.validate()?;
        Ok(candidate)
    }

    /// Check the parameter invariants: a square covariance matching the
    /// mean's dimensionality, symmetric within tolerance.
    ///
    /// Deserialization bypasses `new`, so anything accepting stored
    /// components (warm-start reconstruction) must re-run this.
    pub(crate) fn validate(&self) -> Result<()> {
        let d = self.mean.len();
        if self.covariance.nrows() != d || self.covariance.ncols() != d {
            return Err(MixFitError::DimensionMismatch(format!(
                "mean has dimensionality {} but covariance is {}x{}",
                d,
                self.covariance.nrows(),
                self.covariance.ncols()
            )));
        }
        for i in 0..d {
            for j in (i + 1)..d {
                if (self.covariance[[i, j]] - self.covariance[[j, i]]).abs() > 1e-9 {
                    return Err(MixFitError::Numerical(format!(
                        "covariance is not symmetric at ({i}, {j})"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn dimensionality(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    /// Replace the parameters in place. Used by the M-step, which has already
    /// built a symmetric covariance of the right shape.
    pub(crate) fn set_parameters(&mut self, mean: Array1<f64>, covariance: Array2<f64>) {
        debug_assert_eq!(mean.len(), covariance.nrows());
        debug_assert_eq!(covariance.nrows(), covariance.ncols());
        self.mean = mean;
        self.covariance = covariance;
    }

    /// Factor the covariance, or fail with a Numerical error if it is not
    /// positive definite (and hence not invertible as a density).
    fn factor(&self) -> Result<Cholesky<f64, Dyn>> {
        to_dmatrix(&self.covariance).cholesky().ok_or_else(|| {
            MixFitError::Numerical(
                "covariance matrix is not positive definite and cannot be inverted".to_string(),
            )
        })
    }

    /// Log-density of a single point.
    pub fn log_density(&self, x: ArrayView1<'_, f64>) -> Result<f64> {
        if x.len() != self.dimensionality() {
            return Err(MixFitError::DimensionMismatch(format!(
                "point has dimensionality {} but component has {}",
                x.len(),
                self.dimensionality()
            )));
        }
        let chol = self.factor()?;
        Ok(log_density_with_factor(&self.mean, &chol, x))
    }

    /// Log-density of every row of `data`, factoring the covariance once.
    pub fn log_density_batch(&self, data: &Array2<f64>) -> Result<Array1<f64>> {
        if data.ncols() != self.dimensionality() {
            return Err(MixFitError::DimensionMismatch(format!(
                "data has dimensionality {} but component has {}",
                data.ncols(),
                self.dimensionality()
            )));
        }
        let chol = self.factor()?;
        let mut out = Array1::zeros(data.nrows());
        for (i, row) in data.outer_iter().enumerate() {
            out[i] = log_density_with_factor(&self.mean, &chol, row);
        }
        Ok(out)
    }

    /// Draw one point from this Gaussian: mean + L z with z standard normal.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Result<Array1<f64>> {
        let d = self.dimensionality();
        let chol = self.factor()?;
        let z = DVector::from_fn(d, |_, _| rng.sample::<f64, _>(StandardNormal));
        let x = chol.l() * z;
        let mut out = self.mean.clone();
        for i in 0..d {
            out[i] += x[i];
        }
        Ok(out)
    }
}

fn log_density_with_factor(
    mean: &Array1<f64>,
    chol: &Cholesky<f64, Dyn>,
    x: ArrayView1<'_, f64>,
) -> f64 {
    let d = mean.len() as f64;
    let ln_2pi = (2.0 * std::f64::consts::PI).ln();

    // log|S| = 2 sum log L_ii
    let log_det: f64 = chol.l_dirty().diagonal().iter().map(|v| v.ln()).sum::<f64>() * 2.0;

    let diff = to_dvector(&(&x.to_owned() - mean));
    let solved = chol.solve(&diff);
    let mahalanobis = diff.dot(&solved);

    -0.5 * (d * ln_2pi + log_det + mahalanobis)
}

// =============================================================================
// Tests
// =============================================================================
