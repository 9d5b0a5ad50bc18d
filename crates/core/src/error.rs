//! Solver error types.

use thiserror::Error;

/// Errors surfaced by the trace minimizer and its collaborators.
///
/// All of these are fatal: the solver halts and releases its resources.
/// Informational events (progress feedback, strategy switches) are logged,
/// never reported as errors.
#[derive(Debug, Error)]
pub enum EigenError {
    /// Fewer than two work blocks were supplied.
    #[error("insufficient workspace: {got} block(s) provided, at least 2 required")]
    InsufficientWorkspace { got: usize },

    /// The Rayleigh trace became NaN or infinite.
    #[error("non-finite Rayleigh trace at iteration {iteration}")]
    DivergentTrace { iteration: usize },

    /// The line search was entered with a guess that is not downhill
    /// from the bracket origin.
    #[error(
        "line search: initial guess {x0} is not downhill from {xmin} (derivative {df_xmin})"
    )]
    BadBracket { xmin: f64, x0: f64, df_xmin: f64 },

    /// The line search was entered with a guess outside the bracket.
    #[error("line search: initial guess {x0} outside the bracket [{xmin}, {xmax}]")]
    GuessOutOfRange { xmin: f64, xmax: f64, x0: f64 },

    /// The bracketing phase of the line search exhausted its interval
    /// without finding a sign change in the derivative.
    #[error("line search failed to bracket a minimum (tolerance {tolerance})")]
    BracketFailure { tolerance: f64 },

    /// The iteration limit was reached before the trace converged.
    #[error("no convergence after {0} iterations")]
    NonConvergence(usize),

    /// A Gram or overlap matrix was not positive definite, so its
    /// Cholesky inversion failed.
    #[error("matrix is not positive definite")]
    IndefiniteGram,
}
