// =============================================================================
// Mixture Model Data Types
// =============================================================================
//
// The parametric model itself, independent of how it is trained:
//
//   - gaussian: one weighted component (mean + covariance, density, sampling)
//   - gmm:      the mixture (weights, likelihood, responsibilities, sampling)
//
// Both types are pure data plus evaluation; all mutation during training
// happens through the solvers module.
//
// =============================================================================

mod gaussian;
mod gmm;

pub use gaussian::Gaussian;
pub use gmm::Gmm;

pub(crate) use gmm::normalize_responsibilities;
