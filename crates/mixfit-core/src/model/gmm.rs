// =============================================================================
// Gaussian Mixture Model
// =============================================================================
//
// The mixture is K weighted Gaussian components over D dimensions:
//
//     p(x) = sum_k  w_k * N(x; mu_k, S_k)        with sum_k w_k = 1
//
// INVARIANTS
// ----------
//   - K >= 1, every component has the same dimensionality D
//   - weights are non-negative and sum to 1 (within floating tolerance)
//
// NUMERICAL STABILITY
// -------------------
// Component densities underflow quickly: a point 40 standard deviations from
// every mean has density ~1e-350 and a naive sum-then-log collapses to
// log(0). All accumulation over components therefore happens in log space
// with the log-sum-exp trick:
//
//     log sum_k exp(a_k) = m + log sum_k exp(a_k - m),   m = max_k a_k
//
// The model is serializable (serde) so a fitted mixture can be stored and
// handed back later as a warm start; dimensionality travels with it and is
// re-validated against the training data at that point.
//
// =============================================================================

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{MixFitError, Result};
use crate::model::Gaussian;

/// Tolerance for the "weights sum to one" invariant when reconstructing a
/// model from stored parts.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// A mixture of weighted multivariate Gaussians.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gmm {
    components: Vec<Gaussian>,
    weights: Array1<f64>,
}

impl Gmm {
    /// Create an untrained mixture: zero means, identity covariances and
    /// uniform weights. This is the state the EM trainer populates.
    pub fn new(gaussians: usize, dimensionality: usize) -> Result<Self> {
        if gaussians == 0 {
            return Err(MixFitError::InvalidConfiguration(
                "number of Gaussians must be at least 1".to_string(),
            ));
        }
        if dimensionality == 0 {
            return Err(MixFitError::InvalidConfiguration(
                "dimensionality must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            components: (0..gaussians)
                .map(|_| Gaussian::standard(dimensionality))
                .collect(),
            weights: Array1::from_elem(gaussians, 1.0 / gaussians as f64),
        })
    }

    /// Reconstruct a mixture from explicit components and weights, e.g. a
    /// deserialized model about to be used as a warm start.
    ///
    /// Validates the mixture invariants; the weights are renormalized to sum
    /// to exactly 1 after passing the tolerance check.
    pub fn from_parts(components: Vec<Gaussian>, weights: Array1<f64>) -> Result<Self> {
        if components.is_empty() {
            return Err(MixFitError::InvalidConfiguration(
                "a mixture needs at least one component".to_string(),
            ));
        }
        if weights.len() != components.len() {
            return Err(MixFitError::DimensionMismatch(format!(
                "{} components but {} weights",
                components.len(),
                weights.len()
            )));
        }
        // Stored components bypassed the validating constructor, so re-check
        // each one's own invariants before the cross-component ones.
        for component in &components {
            component.validate()?;
        }
        let d = components[0].dimensionality();
        if components.iter().any(|c| c.dimensionality() != d) {
            return Err(MixFitError::DimensionMismatch(
                "components disagree on dimensionality".to_string(),
            ));
        }
        if weights.iter().any(|&w| w < 0.0 || !w.is_finite()) {
            return Err(MixFitError::InvalidConfiguration(
                "weights must be finite and non-negative".to_string(),
            ));
        }
        let total: f64 = weights.sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(MixFitError::InvalidConfiguration(format!(
                "weights sum to {total}, expected 1"
            )));
        }
        Ok(Self {
            components,
            weights: weights / total,
        })
    }

    pub fn dimensionality(&self) -> usize {
        self.components[0].dimensionality()
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn component(&self, k: usize) -> Option<&Gaussian> {
        self.components.get(k)
    }

    pub fn components(&self) -> &[Gaussian] {
        &self.components
    }

    pub(crate) fn components_mut(&mut self) -> &mut [Gaussian] {
        &mut self.components
    }

    pub(crate) fn weights_mut(&mut self) -> &mut Array1<f64> {
        &mut self.weights
    }

    /// Per-point, per-component joint log-densities: entry (i, k) is
    /// log w_k + log N(x_i; mu_k, S_k). One covariance factorization per
    /// component, shared across all points.
    pub(crate) fn log_joint_densities(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        let n = data.nrows();
        let k = self.num_components();
        let mut out = Array2::zeros((n, k));
        for (j, (component, &weight)) in
            self.components.iter().zip(self.weights.iter()).enumerate()
        {
            // A zero weight contributes log(0) = -inf, which log-sum-exp
            // handles; it must not poison the other components.
            let log_weight = weight.ln();
            let densities = component.log_density_batch(data)?;
            for i in 0..n {
                out[[i, j]] = log_weight + densities[i];
            }
        }
        Ok(out)
    }

    /// Total log-likelihood of the data under the mixture:
    /// sum_i log sum_k w_k N(x_i; mu_k, S_k), accumulated in log space.
    pub fn log_likelihood(&self, data: &Array2<f64>) -> Result<f64> {
        self.check_data(data)?;
        let joint = self.log_joint_densities(data)?;
        let mut total = 0.0;
        for row in joint.outer_iter() {
            total += log_sum_exp(row);
        }
        Ok(total)
    }

    /// Density of component `k` at a point (the plain multivariate normal
    /// density, without the mixture weight).
    pub fn component_density(&self, x: ArrayView1<'_, f64>, k: usize) -> Result<f64> {
        let component = self.components.get(k).ok_or_else(|| {
            MixFitError::InvalidConfiguration(format!(
                "component index {k} out of range for a {}-component mixture",
                self.num_components()
            ))
        })?;
        Ok(component.log_density(x)?.exp())
    }

    /// Posterior component probabilities for every point: an (n, k) matrix
    /// whose rows sum to 1.
    ///
    /// A point for which every component underflows to zero density gets the
    /// uniform fallback 1/K instead of a division by zero.
    pub fn responsibilities(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_data(data)?;
        let joint = self.log_joint_densities(data)?;
        let (resp, _, _) = normalize_responsibilities(joint);
        Ok(resp)
    }

    /// Most likely component for every point.
    pub fn predict(&self, data: &Array2<f64>) -> Result<Vec<usize>> {
        self.check_data(data)?;
        let joint = self.log_joint_densities(data)?;
        Ok(joint
            .outer_iter()
            .map(|row| {
                let mut best = 0;
                for (j, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = j;
                    }
                }
                best
            })
            .collect())
    }

    /// Draw one point from the mixture: pick a component by weight, then
    /// sample from it.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Result<Array1<f64>> {
        let u: f64 = rng.gen();
        let mut cumulative = 0.0;
        let mut chosen = self.components.len() - 1;
        for (k, &w) in self.weights.iter().enumerate() {
            cumulative += w;
            if u < cumulative {
                chosen = k;
                break;
            }
        }
        self.components[chosen].sample(rng)
    }

    /// Draw `n` points from the mixture as an (n, D) matrix.
    pub fn sample_n<R: Rng>(&self, n: usize, rng: &mut R) -> Result<Array2<f64>> {
        let d = self.dimensionality();
        let mut out = Array2::zeros((n, d));
        for i in 0..n {
            let x = self.sample(rng)?;
            out.row_mut(i).assign(&x);
        }
        Ok(out)
    }

    fn check_data(&self, data: &Array2<f64>) -> Result<()> {
        if data.nrows() == 0 {
            return Err(MixFitError::EmptyInput("data has no points".to_string()));
        }
        if data.ncols() != self.dimensionality() {
            return Err(MixFitError::DimensionMismatch(format!(
                "data has dimensionality {} but the mixture has {}",
                data.ncols(),
                self.dimensionality()
            )));
        }
        Ok(())
    }
}

/// Numerically stable log(sum(exp(values))) over a 1-D view.
pub(crate) fn log_sum_exp(values: ArrayView1<'_, f64>) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        // All -inf (total underflow) or a NaN/inf slipped in; either way the
        // max itself is the honest answer.
        return max;
    }
    max + values.iter().map(|&v| (v - max).exp()).sum::<f64>().ln()
}

/// Turn joint log-densities into normalized responsibilities.
///
/// Returns (responsibilities, total log-likelihood, underflowed-row count).
/// Rows where every component underflowed get the uniform 1/K fallback and
/// contribute the smallest representable log-density instead of -inf, so a
/// trial carrying degenerate rows still reports a finite likelihood but one
/// that loses any comparison against a trial without them.
pub(crate) fn normalize_responsibilities(joint: Array2<f64>) -> (Array2<f64>, f64, usize) {
    let (n, k) = joint.dim();
    let mut resp = Array2::zeros((n, k));
    let mut log_likelihood = 0.0;
    let mut degenerate = 0usize;

    for (i, row) in joint.outer_iter().enumerate() {
        let lse = log_sum_exp(row);
        if lse.is_finite() {
            log_likelihood += lse;
            for j in 0..k {
                resp[[i, j]] = (row[j] - lse).exp();
            }
        } else {
            degenerate += 1;
            log_likelihood += f64::MIN_POSITIVE.ln();
            let uniform = 1.0 / k as f64;
            for j in 0..k {
                resp[[i, j]] = uniform;
            }
        }
    }

    (resp, log_likelihood, degenerate)
}

// =============================================================================
// Tests
// =============================================================================
