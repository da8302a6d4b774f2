// =============================================================================
// EM: Expectation-Maximization for Gaussian Mixtures
// =============================================================================
//
// This is THE algorithm for fitting a GMM by maximum likelihood. The
// likelihood has a sum inside a log, so there is no closed-form solution;
// EM climbs it by alternating two steps that each have one:
//
//     Start from initial parameters (k-means centroids, identity
//     covariances, uniform weights) or from a warm-start model.
//     Repeat:
//         E-step: for every point i and component k, compute the
//                 responsibility r_ik, the posterior probability that
//                 component k generated point i under the current parameters.
//         M-step: re-estimate each component's weight, mean and covariance
//                 as responsibility-weighted sample statistics, then pass
//                 the covariance through the active constraint policy.
//         Stop when the log-likelihood improvement drops below the
//         tolerance, or the iteration cap is reached.
//
// Each E-step evaluates the likelihood of the parameters produced by the
// previous M-step, so one density evaluation per iteration serves both the
// responsibilities and the convergence check.
//
// THE GUARANTEE (and where it bends)
// ----------------------------------
// Textbook EM never decreases the log-likelihood. Two numerical patches can
// bend that guarantee and are therefore explicit, logged policies rather
// than silent heuristics:
//
//   - A point whose density underflows under EVERY component would divide
//     by zero in the E-step; it gets uniform responsibilities instead.
//   - A component whose total responsibility mass collapses below
//     `mass_floor` would produce an undefined mean and a singular
//     covariance; it is reseeded on a random data point with identity
//     covariance and a floor weight.
//
// TERMINAL STATES
// ---------------
// Converged and the iteration cap both yield a valid model plus its final
// log-likelihood (`converged` distinguishes them). A covariance that cannot
// be factored, or a non-finite likelihood, aborts the run with a Numerical
// error; the multi-trial orchestrator treats that as one lost trial, not a
// failure of the whole training call.
//
// =============================================================================

use ndarray::{Array1, Array2};
use rand::Rng;

use crate::constraint::CovarianceConstraint;
use crate::error::{MixFitError, Result};
use crate::init::Initializer;
use crate::model::{normalize_responsibilities, Gmm};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for one EM fit.
///
/// The defaults mirror the reference tool's: 250 iterations, a 1e-10
/// tolerance, positive-definite covariance enforcement and plain k-means
/// initialization.
#[derive(Debug, Clone)]
pub struct EmConfig {
    /// Maximum number of EM iterations. 0 means run until convergence with
    /// no cap; callers needing bounded runtime must set a positive value.
    pub max_iterations: usize,

    /// Minimum absolute log-likelihood improvement per iteration to keep
    /// iterating. Must not be negative.
    pub tolerance: f64,

    /// Covariance correction applied after every M-step.
    pub constraint: CovarianceConstraint,

    /// How the initial centroids are produced when no warm-start model is
    /// supplied.
    pub initializer: Initializer,

    /// Responsibility mass below which a component is considered collapsed
    /// and reseeded. Tunable because reference implementations disagree on
    /// the exact threshold; the default is conservative.
    pub mass_floor: f64,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 250,
            tolerance: 1e-10,
            constraint: CovarianceConstraint::default(),
            initializer: Initializer::default(),
            mass_floor: 1e-8,
        }
    }
}

impl EmConfig {
    /// Reject out-of-range values before any computation starts.
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(MixFitError::InvalidConfiguration(format!(
                "tolerance must be a non-negative finite number, got {}",
                self.tolerance
            )));
        }
        if !self.mass_floor.is_finite() || self.mass_floor <= 0.0 {
            return Err(MixFitError::InvalidConfiguration(format!(
                "mass floor must be a positive finite number, got {}",
                self.mass_floor
            )));
        }
        self.initializer.validate()
    }
}

// =============================================================================
// Result Structure
// =============================================================================

/// Results from one EM fit (the fitted model itself is updated in place).
#[derive(Debug, Clone)]
pub struct EmResult {
    /// Log-likelihood of the data under the final parameters.
    pub log_likelihood: f64,

    /// Number of completed E+M iterations.
    pub iterations: usize,

    /// True if the tolerance criterion stopped the loop; false if the
    /// iteration cap did. Both leave a valid model behind.
    pub converged: bool,

    /// Log-likelihood trajectory, one entry per likelihood evaluation
    /// (the first entry is the likelihood of the initial parameters).
    pub history: Vec<f64>,

    /// Iterations in which at least one point underflowed under every
    /// component and received uniform responsibilities.
    pub degenerate_iterations: usize,

    /// Total number of collapsed components that were reseeded.
    pub reseeds: usize,
}

// =============================================================================
// Fitting
// =============================================================================

/// Run EM to convergence for one trial, updating `gmm` in place.
///
/// If `warm_start` is true the current parameters of `gmm` are the starting
/// estimate; otherwise the configured initializer produces the starting
/// centroids (identity covariances, uniform weights). Dimensionality
/// agreement between `gmm` and `data` is the caller's contract and is
/// re-checked here.
pub fn fit<R: Rng>(
    data: &Array2<f64>,
    gmm: &mut Gmm,
    config: &EmConfig,
    rng: &mut R,
    warm_start: bool,
) -> Result<EmResult> {
    config.validate()?;

    let n = data.nrows();
    let d = data.ncols();
    let k = gmm.num_components();

    if n == 0 {
        return Err(MixFitError::EmptyInput("data has no points".to_string()));
    }
    if d != gmm.dimensionality() {
        return Err(MixFitError::DimensionMismatch(format!(
            "data has dimensionality {d} but the model has {}",
            gmm.dimensionality()
        )));
    }

    if !warm_start {
        let centroids = config.initializer.initial_centroids(data, k, rng)?;
        for (c, component) in gmm.components_mut().iter_mut().enumerate() {
            component.set_parameters(centroids.row(c).to_owned(), Array2::eye(d));
        }
        gmm.weights_mut().fill(1.0 / k as f64);
    }

    let mut old_ll = f64::NEG_INFINITY;
    let mut history = Vec::new();
    let mut iterations = 0usize;
    let mut converged = false;
    let mut degenerate_iterations = 0usize;
    let mut reseeds = 0usize;
    let final_ll;

    loop {
        // E-step. Also yields the log-likelihood of the parameters left by
        // the previous M-step (or the initial parameters on the first pass).
        let joint = gmm.log_joint_densities(data)?;
        let (resp, ll, degenerate_points) = normalize_responsibilities(joint);

        if ll.is_nan() || ll == f64::INFINITY {
            return Err(MixFitError::Numerical(format!(
                "log-likelihood became non-finite ({ll}) at iteration {iterations}"
            )));
        }
        if degenerate_points > 0 {
            degenerate_iterations += 1;
            log::warn!(
                "iteration {iterations}: {degenerate_points} point(s) underflowed under every \
                 component; assigned uniform responsibilities"
            );
        }
        history.push(ll);
        log::debug!("iteration {iterations}: log-likelihood = {ll:.6}");

        if (ll - old_ll).abs() < config.tolerance {
            converged = true;
            final_ll = ll;
            break;
        }
        if config.max_iterations > 0 && iterations >= config.max_iterations {
            final_ll = ll;
            break;
        }

        old_ll = ll;
        iterations += 1;
        reseeds += m_step(data, &resp, gmm, config, rng);
    }

    Ok(EmResult {
        log_likelihood: final_ll,
        iterations,
        converged,
        history,
        degenerate_iterations,
        reseeds,
    })
}

/// Re-estimate every component from the responsibilities.
///
/// Returns the number of collapsed components that were reseeded.
fn m_step<R: Rng>(
    data: &Array2<f64>,
    resp: &Array2<f64>,
    gmm: &mut Gmm,
    config: &EmConfig,
    rng: &mut R,
) -> usize {
    let n = data.nrows();
    let d = data.ncols();
    let k = gmm.num_components();

    let mut new_weights = Array1::zeros(k);
    let mut reseeds = 0usize;

    for c in 0..k {
        let mass: f64 = resp.column(c).sum();

        if mass < config.mass_floor {
            // The component lost all its mass. Leaving it in place would
            // mean an undefined mean and a singular covariance, so reseed
            // it on a random data point and let later iterations pull it
            // somewhere useful.
            let seed_point = rng.gen_range(0..n);
            log::warn!(
                "component {c} collapsed (mass {mass:.3e}); reseeding on data point {seed_point}"
            );
            gmm.components_mut()[c]
                .set_parameters(data.row(seed_point).to_owned(), Array2::eye(d));
            new_weights[c] = config.mass_floor;
            reseeds += 1;
            continue;
        }

        // Weighted mean.
        let mut mean = Array1::zeros(d);
        for (i, point) in data.outer_iter().enumerate() {
            let r = resp[[i, c]];
            for j in 0..d {
                mean[j] += r * point[j];
            }
        }
        mean /= mass;

        // Weighted covariance, built symmetric: accumulate the upper
        // triangle and mirror it.
        let mut covariance = Array2::zeros((d, d));
        for (i, point) in data.outer_iter().enumerate() {
            let r = resp[[i, c]];
            for a in 0..d {
                let da = point[a] - mean[a];
                for b in a..d {
                    covariance[[a, b]] += r * da * (point[b] - mean[b]);
                }
            }
        }
        for a in 0..d {
            for b in (a + 1)..d {
                covariance[[a, b]] /= mass;
                covariance[[b, a]] = covariance[[a, b]];
            }
            covariance[[a, a]] /= mass;
        }

        config.constraint.apply(&mut covariance);
        gmm.components_mut()[c].set_parameters(mean, covariance);
        new_weights[c] = mass / n as f64;
    }

    // Renormalize so the weights sum to exactly 1 even after flooring a
    // reseeded component.
    let total = new_weights.sum();
    *gmm.weights_mut() = new_weights / total;

    reseeds
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::SymmetricEigen;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::convert::to_dmatrix;

    /// Two tight clusters around (0, 0) and (10, 10), 16 points each.
    fn two_cluster_data() -> Array2<f64> {
        let offsets = [
            (0.3, 0.1),
            (-0.2, 0.4),
            (0.1, -0.3),
            (-0.4, -0.1),
            (0.2, 0.2),
            (-0.1, 0.3),
            (0.4, -0.2),
            (-0.3, -0.4),
            (0.0, 0.5),
            (0.5, 0.0),
            (-0.5, 0.1),
            (0.1, -0.5),
            (0.25, 0.35),
            (-0.35, 0.25),
            (0.15, -0.15),
            (-0.05, 0.05),
        ];
        let mut data = Array2::zeros((32, 2));
        for (i, &(dx, dy)) in offsets.iter().enumerate() {
            data[[i, 0]] = dx;
            data[[i, 1]] = dy;
            data[[16 + i, 0]] = 10.0 + dx;
            data[[16 + i, 1]] = 10.0 + dy;
        }
        data
    }

    #[test]
    fn test_log_likelihood_is_monotone() {
        // Run exactly 50 M-steps (zero tolerance disables the convergence
        // check) and assert the core EM guarantee on the trajectory.
        let data = two_cluster_data();
        let mut gmm = Gmm::new(2, 2).unwrap();
        let config = EmConfig {
            max_iterations: 50,
            tolerance: 0.0,
            ..EmConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(4);
        let result = fit(&data, &mut gmm, &config, &mut rng, false).unwrap();

        assert_eq!(result.iterations, 50);
        assert!(result.history.len() > 50);
        for pair in result.history.windows(2) {
            assert!(
                pair[1] >= pair[0] - 1e-7,
                "log-likelihood decreased: {} -> {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_weights_and_symmetry_invariants() {
        let data = two_cluster_data();
        let mut gmm = Gmm::new(2, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        fit(&data, &mut gmm, &EmConfig::default(), &mut rng, false).unwrap();

        assert_abs_diff_eq!(gmm.weights().sum(), 1.0, epsilon = 1e-9);
        for component in gmm.components() {
            let cov = component.covariance();
            for a in 0..2 {
                for b in 0..2 {
                    assert_eq!(cov[[a, b]], cov[[b, a]]);
                }
            }
        }
    }

    #[test]
    fn test_positive_definite_floor_on_collinear_data() {
        // Every point lies on the line y = 2x, so the raw sample covariance
        // is rank 1. The positive-definite repair must still leave every
        // eigenvalue at or above the floor.
        let mut data = Array2::zeros((20, 2));
        for i in 0..20 {
            data[[i, 0]] = i as f64;
            data[[i, 1]] = 2.0 * i as f64;
        }
        let floor = 1e-8;
        let config = EmConfig {
            constraint: CovarianceConstraint::PositiveDefinite { min_eigenvalue: floor },
            max_iterations: 25,
            ..EmConfig::default()
        };
        let mut gmm = Gmm::new(2, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(12);
        fit(&data, &mut gmm, &config, &mut rng, false).unwrap();

        for component in gmm.components() {
            let min_eig = SymmetricEigen::new(to_dmatrix(component.covariance()))
                .eigenvalues
                .iter()
                .cloned()
                .fold(f64::INFINITY, f64::min);
            assert!(
                min_eig >= floor * (1.0 - 1e-9),
                "minimum eigenvalue {min_eig} fell below the floor"
            );
        }
    }

    #[test]
    fn test_no_constraint_on_degenerate_data_fails_numerically() {
        // Duplicated-coordinate data with the pass-through constraint: the
        // first M-step produces the exactly singular covariance
        // [[4, 4], [4, 4]] (every intermediate value is dyadic, so no
        // rounding can sneak in a positive pivot) and the next E-step
        // cannot factor it. The trial must fail with a Numerical error,
        // not panic.
        let mut data = Array2::zeros((10, 2));
        for i in 0..10 {
            let x = if i % 2 == 0 { 2.0 } else { -2.0 };
            data[[i, 0]] = x;
            data[[i, 1]] = x;
        }
        let config = EmConfig {
            constraint: CovarianceConstraint::None,
            ..EmConfig::default()
        };
        let mut gmm = Gmm::new(1, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let err = fit(&data, &mut gmm, &config, &mut rng, false).unwrap_err();
        assert!(matches!(err, MixFitError::Numerical(_)));
    }

    #[test]
    fn test_k_equals_distinct_points() {
        // One component per distinct point: components converge to
        // near-singletons, exercising the collapse-repair path without
        // crashing.
        let data = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [5.0, 5.0], [6.0, 5.0]];
        let config = EmConfig {
            max_iterations: 50,
            ..EmConfig::default()
        };
        let mut gmm = Gmm::new(5, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(21);
        let result = fit(&data, &mut gmm, &config, &mut rng, false).unwrap();
        assert!(result.log_likelihood.is_finite());
        assert_abs_diff_eq!(gmm.weights().sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_warm_start_skips_initialization() {
        // Fit once, then warm-start from the fitted model: EM from an
        // already-converged point must not regress the likelihood.
        let data = two_cluster_data();
        let mut gmm = Gmm::new(2, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(31);
        let first = fit(&data, &mut gmm, &EmConfig::default(), &mut rng, false).unwrap();

        let mut rng2 = StdRng::seed_from_u64(77);
        let second = fit(&data, &mut gmm, &EmConfig::default(), &mut rng2, true).unwrap();
        assert!(second.log_likelihood >= first.log_likelihood - 1e-6);
        assert!(second.iterations <= first.iterations);
    }

    #[test]
    fn test_invalid_tolerance_rejected() {
        let config = EmConfig {
            tolerance: -1.0,
            ..EmConfig::default()
        };
        let mut gmm = Gmm::new(1, 1).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let err = fit(&array![[0.0]], &mut gmm, &config, &mut rng, false).unwrap_err();
        assert!(matches!(err, MixFitError::InvalidConfiguration(_)));
    }
}
