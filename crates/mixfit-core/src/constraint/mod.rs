// =============================================================================
// Covariance Constraint Policies
// =============================================================================
//
// After every M-step the raw covariance estimate is passed through one of a
// closed set of constraint policies:
//
//   - None:             pass-through. Fastest, but a collapsed component can
//                       leave a singular matrix behind and kill the trial.
//   - Diagonal:         keep only per-dimension variances. Cheaper and very
//                       stable, but the model can no longer represent
//                       correlated dimensions.
//   - PositiveDefinite: eigendecompose, clamp every eigenvalue to a small
//                       positive floor, reconstruct. Guarantees the matrix is
//                       invertible on every iteration, which is why it is the
//                       default: EM cannot compute a finite likelihood from a
//                       singular covariance.
//
// The set is closed by design (a tagged enum, not an open trait): these three
// behaviors are the model's covariance vocabulary, selected once per training
// configuration.
//
// =============================================================================

use nalgebra::SymmetricEigen;
use ndarray::Array2;

use crate::convert::{symmetrize, to_array2, to_dmatrix};

/// Default eigenvalue floor for the positive-definite repair.
///
/// Deliberately conservative: far above the subnormal range, far below any
/// variance a reasonably scaled dataset produces. Tunable per configuration
/// because reference implementations disagree on the exact threshold.
pub const DEFAULT_EIGENVALUE_FLOOR: f64 = 1e-10;

/// Policy applied to every covariance matrix after each M-step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CovarianceConstraint {
    /// Use the raw M-step estimate unmodified.
    None,
    /// Zero all off-diagonal entries, keeping per-dimension variances.
    Diagonal,
    /// Clamp eigenvalues to `min_eigenvalue`, guaranteeing invertibility.
    PositiveDefinite { min_eigenvalue: f64 },
}

impl Default for CovarianceConstraint {
    fn default() -> Self {
        Self::PositiveDefinite {
            min_eigenvalue: DEFAULT_EIGENVALUE_FLOOR,
        }
    }
}

impl CovarianceConstraint {
    /// The positive-definite repair with the default eigenvalue floor.
    pub fn positive_definite() -> Self {
        Self::default()
    }

    /// Whether this policy guarantees the corrected matrix is invertible.
    pub fn guarantees_invertible(&self) -> bool {
        matches!(self, Self::PositiveDefinite { .. })
    }

    /// Correct a candidate covariance in place so it satisfies the policy.
    pub fn apply(&self, covariance: &mut Array2<f64>) {
        match *self {
            Self::None => {}
            Self::Diagonal => {
                let n = covariance.nrows();
                for i in 0..n {
                    for j in 0..n {
                        if i != j {
                            covariance[[i, j]] = 0.0;
                        }
                    }
                }
            }
            Self::PositiveDefinite { min_eigenvalue } => {
                let eigen = SymmetricEigen::new(to_dmatrix(covariance));
                if eigen.eigenvalues.iter().all(|&v| v >= min_eigenvalue) {
                    return;
                }
                let mut values = eigen.eigenvalues;
                for v in values.iter_mut() {
                    if *v < min_eigenvalue {
                        *v = min_eigenvalue;
                    }
                }
                let q = eigen.eigenvectors;
                let rebuilt = &q * nalgebra::DMatrix::from_diagonal(&values) * q.transpose();
                *covariance = to_array2(&rebuilt);
                // Q Lambda Q' is symmetric only up to roundoff.
                symmetrize(covariance);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn min_eigenvalue(a: &Array2<f64>) -> f64 {
        SymmetricEigen::new(to_dmatrix(a))
            .eigenvalues
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn test_none_is_pass_through() {
        let mut cov = array![[1.0, 0.9], [0.9, 1.0]];
        let original = cov.clone();
        CovarianceConstraint::None.apply(&mut cov);
        assert_eq!(cov, original);
    }

    #[test]
    fn test_diagonal_zeroes_off_diagonal() {
        let mut cov = array![[2.0, 0.7, -0.1], [0.7, 3.0, 0.5], [-0.1, 0.5, 1.0]];
        CovarianceConstraint::Diagonal.apply(&mut cov);
        assert_eq!(cov, array![[2.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 1.0]]);
    }

    #[test]
    fn test_positive_definite_repairs_singular_matrix() {
        // Rank-1: eigenvalues are 2 and 0.
        let mut cov = array![[1.0, 1.0], [1.0, 1.0]];
        CovarianceConstraint::positive_definite().apply(&mut cov);
        assert!(min_eigenvalue(&cov) >= DEFAULT_EIGENVALUE_FLOOR * (1.0 - 1e-9));
        // Still symmetric.
        assert_eq!(cov[[0, 1]], cov[[1, 0]]);
    }

    #[test]
    fn test_positive_definite_repairs_negative_eigenvalue() {
        // Indefinite matrix, eigenvalues 3 and -1.
        let mut cov = array![[1.0, 2.0], [2.0, 1.0]];
        let floor = 1e-6;
        CovarianceConstraint::PositiveDefinite { min_eigenvalue: floor }.apply(&mut cov);
        assert!(min_eigenvalue(&cov) >= floor * (1.0 - 1e-9));
    }

    #[test]
    fn test_positive_definite_keeps_healthy_matrix() {
        let mut cov = array![[2.0, 0.3], [0.3, 1.5]];
        let original = cov.clone();
        CovarianceConstraint::positive_definite().apply(&mut cov);
        for i in 0..2 {
            for j in 0..2 {
                assert_abs_diff_eq!(cov[[i, j]], original[[i, j]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_default_guarantees_invertibility() {
        assert!(CovarianceConstraint::default().guarantees_invertible());
        assert!(!CovarianceConstraint::None.guarantees_invertible());
        assert!(!CovarianceConstraint::Diagonal.guarantees_invertible());
    }
}
