// =============================================================================
// Multi-Trial Training Orchestration
// =============================================================================
//
// EM only finds a local maximum, so the standard remedy is to run several
// independent trials from different random initializations and keep the
// best-likelihood result. The trials share nothing but the read-only data
// matrix: each owns its model, its responsibility buffers and its own
// deterministically-derived RNG, which makes the map over trials
// embarrassingly parallel (rayon) and the reduction a plain scan over the
// order-preserving collected results.
//
// A trial that fails numerically is logged and skipped; only if every trial
// fails does the whole call fail (NoValidModel). Ties on the best likelihood
// go to the earliest trial, so a fixed seed gives a fixed winner.
//
// Warm starts: a previously fitted model can be supplied as the starting
// estimate. Every trial then starts from it (which makes extra trials
// redundant in practice, but is not disallowed); its dimensionality must
// match the data or the call fails up front.
//
// =============================================================================

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{MixFitError, Result};
use crate::model::Gmm;
use crate::solvers::em::{self, EmConfig, EmResult};

// =============================================================================
// Configuration & Result
// =============================================================================

/// Configuration for a full training call.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Number of independent trials. Must be at least 1.
    pub trials: usize,

    /// Base random seed. 0 selects a time-based seed; any other value makes
    /// the whole training call reproducible. Per-trial seeds are derived
    /// deterministically from this value.
    pub seed: u64,

    /// The EM configuration shared by every trial.
    pub em: EmConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainConfig {
    /// One trial, time-based seed, default EM settings.
    pub fn new() -> Self {
        Self {
            trials: 1,
            seed: 0,
            em: EmConfig::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.trials == 0 {
            return Err(MixFitError::InvalidConfiguration(
                "number of trials must be at least 1".to_string(),
            ));
        }
        self.em.validate()
    }
}

/// The best-of-N training outcome.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    /// The fitted mixture with the highest log-likelihood across trials.
    pub model: Gmm,

    /// The log-likelihood that model achieved on the training data.
    pub log_likelihood: f64,

    /// Whether the winning trial converged (vs. hitting the iteration cap).
    pub converged: bool,

    /// Iterations the winning trial ran.
    pub iterations: usize,

    /// Trials that failed with a numerical error and were skipped.
    pub failed_trials: usize,
}

// =============================================================================
// Entry Points
// =============================================================================

/// Train a fresh `gaussians`-component mixture on `data` (n points x d
/// dimensions), running `config.trials` independent initializations and
/// keeping the best-likelihood result.
pub fn train_gmm(data: &Array2<f64>, gaussians: usize, config: &TrainConfig) -> Result<TrainOutcome> {
    if gaussians == 0 {
        return Err(MixFitError::InvalidConfiguration(
            "number of Gaussians must be at least 1".to_string(),
        ));
    }
    run_trials(data, gaussians, None, config)
}

/// Train starting from a previously fitted model (warm start).
///
/// The number of components comes from the model; its dimensionality must
/// match the data.
pub fn train_gmm_warm(
    data: &Array2<f64>,
    warm_start: &Gmm,
    config: &TrainConfig,
) -> Result<TrainOutcome> {
    if warm_start.dimensionality() != data.ncols() {
        return Err(MixFitError::DimensionMismatch(format!(
            "data has dimensionality {} but the warm-start model has {}",
            data.ncols(),
            warm_start.dimensionality()
        )));
    }
    run_trials(data, warm_start.num_components(), Some(warm_start), config)
}

fn run_trials(
    data: &Array2<f64>,
    gaussians: usize,
    warm_start: Option<&Gmm>,
    config: &TrainConfig,
) -> Result<TrainOutcome> {
    config.validate()?;

    if data.nrows() == 0 || data.ncols() == 0 {
        return Err(MixFitError::EmptyInput(format!(
            "data matrix is {}x{}",
            data.nrows(),
            data.ncols()
        )));
    }
    if gaussians > data.nrows() {
        return Err(MixFitError::InvalidConfiguration(format!(
            "cannot fit {gaussians} Gaussians to {} points",
            data.nrows()
        )));
    }

    let base = base_seed(config.seed);

    // Each trial is a pure computation over owned buffers; only the final
    // best-result scan below needs to run in order.
    let outcomes: Vec<Result<(Gmm, EmResult)>> = (0..config.trials)
        .into_par_iter()
        .map(|trial| {
            let mut rng = StdRng::seed_from_u64(trial_seed(base, trial));
            let mut model = match warm_start {
                Some(m) => m.clone(),
                None => Gmm::new(gaussians, data.ncols())?,
            };
            let result = em::fit(data, &mut model, &config.em, &mut rng, warm_start.is_some())?;
            Ok((model, result))
        })
        .collect();

    let mut best: Option<(Gmm, EmResult)> = None;
    let mut failed_trials = 0usize;
    for (trial, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok((model, result)) => {
                log::debug!(
                    "trial {trial}: log-likelihood {:.6} after {} iterations (converged: {})",
                    result.log_likelihood,
                    result.iterations,
                    result.converged
                );
                let better = match &best {
                    // Strict comparison keeps the earliest trial on ties.
                    Some((_, current)) => result.log_likelihood > current.log_likelihood,
                    None => true,
                };
                if better {
                    best = Some((model, result));
                }
            }
            Err(err) => {
                failed_trials += 1;
                log::warn!("trial {trial} failed and was skipped: {err}");
            }
        }
    }

    match best {
        Some((model, result)) => {
            log::debug!("best log-likelihood across trials: {:.6}", result.log_likelihood);
            Ok(TrainOutcome {
                model,
                log_likelihood: result.log_likelihood,
                converged: result.converged,
                iterations: result.iterations,
                failed_trials,
            })
        }
        None => Err(MixFitError::NoValidModel),
    }
}

// =============================================================================
// Seed Derivation
// =============================================================================

fn base_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    // Time-based fallback, mirroring the reference tool's seed-0 behavior.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x4d69_7846_6974)
}

/// Deterministic per-trial seed. Trial 0 uses the base seed itself, so a
/// single-trial run is seeded exactly as configured.
fn trial_seed(base: u64, trial: usize) -> u64 {
    base ^ (trial as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

// =============================================================================
// Tests
// =============================================================================
