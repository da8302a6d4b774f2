// =============================================================================
// MixFit Core Library
// =============================================================================
//
// This is the entry point for the Gaussian mixture model training library.
// It fits a parametric mixture of multivariate Gaussians to a dense matrix
// of real-valued points by expectation-maximization, for density estimation,
// soft clustering and anomaly scoring.
//
// STRUCTURE:
// ----------
// The library is organized into modules, each handling a specific concern:
//
//   - model:      the mixture itself (components, weights, likelihood,
//                 responsibilities, sampling, serialization)
//   - constraint: covariance constraint policies applied after every M-step
//   - init:       the k-means primitive and the initializer policies
//                 (plain k-means, Bradley-Fayyad refined start)
//   - solvers:    the EM iteration loop and the best-of-N trial orchestrator
//   - data:       dataset perturbation helpers (noise injection)
//   - convert:    ndarray <-> nalgebra bridges for the factorization code
//   - error:      error types used throughout the library
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
//   1. Add it to the appropriate module (or create a new one)
//   2. Write tests in that module (see existing tests for examples)
//   3. Re-export public items here so users can access them easily
//
// =============================================================================

// Declare our modules - each is in its own file or folder
pub mod constraint;
pub mod convert;
pub mod data;
pub mod error;
pub mod init;
pub mod model;
pub mod solvers;

// Re-export commonly used items at the top level for convenience
pub use constraint::CovarianceConstraint;
pub use data::add_gaussian_noise;
pub use error::{MixFitError, Result};
pub use init::Initializer;
pub use model::{Gaussian, Gmm};
pub use solvers::{train_gmm, train_gmm_warm, EmConfig, EmResult, TrainConfig, TrainOutcome};
