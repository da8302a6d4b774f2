// =============================================================================
// Mixture Model Solvers
// =============================================================================
//
// This module contains the algorithms that actually fit the mixture.
//
// HOW GMM FITTING WORKS (High-Level Overview)
// -------------------------------------------
//
// We want parameters (weights w_k, means mu_k, covariances S_k) maximizing
// the likelihood of the data under
//
//     p(x) = sum_k  w_k * N(x; mu_k, S_k)
//
// The sum sits inside the log of the likelihood, so there is no closed-form
// maximum. EM (in `em`) climbs iteratively: soft-assign points to components
// under the current parameters, re-estimate the parameters from those
// assignments, repeat until the likelihood stops improving.
//
// Because EM only finds a local maximum, the trainer (in `trainer`)
// orchestrates several independent trials from different initializations and
// keeps the best result.
//
// =============================================================================

pub mod em;
mod trainer;

pub use em::{fit, EmConfig, EmResult};
pub use trainer::{train_gmm, train_gmm_warm, TrainConfig, TrainOutcome};
