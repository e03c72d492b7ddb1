use thiserror::Error;

use crate::error::ValidationError;

/// Failure of a single optimisation run.
///
/// Run failures are caught per run and never propagate: a failed run is
/// logged and excluded from the result table, leaving its siblings
/// untouched. The batch as a whole can only be rejected by a
/// [`ValidationError`] at configuration time.
#[derive(Error, Debug)]
pub enum RunFailure {
    #[error("optimiser error: {0}")]
    Solver(argmin::core::Error),
    #[error("solver panic")]
    SolverPanic,
    #[error("the optimiser produced no parameter vector")]
    NoSolution,
    #[error("the best score is not finite")]
    NonFiniteScore,
    #[error("invalid run configuration: {0}")]
    Configuration(#[from] ValidationError),
}
