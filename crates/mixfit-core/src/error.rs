// =============================================================================
// Error Types
// =============================================================================
//
// All fallible operations in this crate return `Result<T>` with a single
// error enum. The variants map onto the distinct failure conditions a caller
// can meaningfully react to:
//
//   - InvalidConfiguration: rejected before any computation starts
//   - DimensionMismatch:    shapes disagree (data vs. model, data vs. data)
//   - EmptyInput:           no points / no dimensions to work with
//   - Numerical:            a covariance could not be inverted or a
//                           likelihood became non-finite during one trial
//   - NoValidModel:         every training trial failed
//
// Note that the per-iteration self-repairs (component reseeding, uniform
// responsibility fallback) are NOT errors. They are logged and counted but
// training continues; see the solvers module.
//
// =============================================================================

use thiserror::Error;

/// Errors that can occur during mixture model training and evaluation.
#[derive(Error, Debug)]
pub enum MixFitError {
    /// A configuration value is out of its valid range. Checked up front,
    /// before any clustering or EM work begins.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Shapes disagree, e.g. a warm-start model whose dimensionality does
    /// not match the training data.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The input data has no rows or no columns.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// A covariance matrix could not be factored / inverted, or the
    /// log-likelihood became non-finite. Aborts the current trial only.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Every trial of a multi-trial training run failed with a numerical
    /// error, so there is no model to return.
    #[error("no trial produced a valid model")]
    NoValidModel,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MixFitError>;
