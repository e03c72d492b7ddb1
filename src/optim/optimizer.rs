//! Optimisation algorithms for MAP searches.
//!
//! The supported algorithms are derivative-free: MAP objectives are only
//! available as callables, without gradients. Each algorithm is run through
//! the argmin [`Executor`]; a single search is wrapped in
//! `std::panic::catch_unwind` so that a panicking solver is reported as a
//! [`RunFailure`] instead of tearing down sibling runs.

use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;

use argmin::core::observers::ObserverMode;
use argmin::core::{CostFunction, Executor, State};
use argmin::solver::neldermead::NelderMead;
use argmin::solver::particleswarm::ParticleSwarm;
use argmin_observer_slog::SlogLogger;
use ndarray::{Array1, ArrayView1};

use crate::error::ValidationError;
use crate::objective::{LogPdf, ReducedLogPdf};
use crate::optim::error::RunFailure;
use crate::optim::transformation::Transformation;

/// Number of particles used by the particle-swarm optimiser.
const SWARM_SIZE: usize = 40;

/// A maximum-a-posteriori search over a (possibly reduced, possibly
/// transformed) log-pdf.
///
/// argmin minimises, so the cost is the negated log-pdf. Non-finite scores
/// are mapped to infinite cost to keep the solvers' bookkeeping stable; a
/// run whose best cost stays non-finite is reported as failed afterwards.
pub(crate) struct MapSearch {
    objective: ObjectiveHandle,
    transform: Option<Transformation>,
}

/// The objective of a single run: either the raw log-pdf or a per-worker
/// reduced view of it.
pub(crate) enum ObjectiveHandle {
    Full(Arc<dyn LogPdf + Send + Sync>),
    Reduced(ReducedLogPdf),
}

impl ObjectiveHandle {
    fn evaluate(&self, parameters: &ArrayView1<f64>) -> f64 {
        match self {
            ObjectiveHandle::Full(log_pdf) => log_pdf.evaluate(parameters),
            ObjectiveHandle::Reduced(reduced) => reduced.evaluate(parameters),
        }
    }
}

impl MapSearch {
    pub(crate) fn new(objective: ObjectiveHandle, transform: Option<Transformation>) -> Self {
        Self {
            objective,
            transform,
        }
    }
}

impl CostFunction for MapSearch {
    type Param = Array1<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let score = match &self.transform {
            Some(transform) => {
                let model_param = transform.to_model(&param.view());
                self.objective.evaluate(&model_param.view())
            }
            None => self.objective.evaluate(&param.view()),
        };

        if score.is_finite() {
            Ok(-score)
        } else {
            Ok(f64::INFINITY)
        }
    }
}

/// Identifier of a supported optimisation algorithm.
///
/// # Variants
/// * `NelderMead` - Downhill simplex search, started from the run's initial
///   point
/// * `ParticleSwarm` - Swarm search over a box spanned around the run's
///   initial point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Optimiser {
    #[default]
    NelderMead,
    ParticleSwarm,
}

impl FromStr for Optimiser {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nelder-mead" | "neldermead" => Ok(Optimiser::NelderMead),
            "particle-swarm" | "particleswarm" | "pso" => Ok(Optimiser::ParticleSwarm),
            other => Err(ValidationError::UnknownOptimiser(other.to_string())),
        }
    }
}

impl Optimiser {
    /// Runs one search and returns the best point in search space together
    /// with its score (log-pdf scale, higher is better).
    pub(crate) fn minimise(
        &self,
        search: MapSearch,
        start: Array1<f64>,
        max_iters: u64,
        log_to_screen: bool,
    ) -> Result<(Array1<f64>, f64), RunFailure> {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| match self {
            Optimiser::NelderMead => run_nelder_mead(search, start, max_iters, log_to_screen),
            Optimiser::ParticleSwarm => {
                run_particle_swarm(search, start, max_iters, log_to_screen)
            }
        }))
        .map_err(|_| RunFailure::SolverPanic)?;

        let (estimate, best_cost) = outcome?;
        if !best_cost.is_finite() {
            return Err(RunFailure::NonFiniteScore);
        }

        Ok((estimate, -best_cost))
    }
}

fn run_nelder_mead(
    search: MapSearch,
    start: Array1<f64>,
    max_iters: u64,
    log_to_screen: bool,
) -> Result<(Array1<f64>, f64), RunFailure> {
    let solver = NelderMead::new(initial_simplex(&start));

    let mut executor =
        Executor::new(search, solver).configure(|state| state.max_iters(max_iters));
    if log_to_screen {
        executor = executor.add_observer(SlogLogger::term(), ObserverMode::Always);
    }

    let result = executor.run().map_err(RunFailure::Solver)?;
    let best = result
        .state
        .get_best_param()
        .cloned()
        .ok_or(RunFailure::NoSolution)?;
    let best_cost = result.state.get_best_cost();

    Ok((best, best_cost))
}

fn run_particle_swarm(
    search: MapSearch,
    start: Array1<f64>,
    max_iters: u64,
    log_to_screen: bool,
) -> Result<(Array1<f64>, f64), RunFailure> {
    // The swarm explores a box spanned around the run's start point; the
    // half-width grows with the coordinate's magnitude but never collapses.
    let spread = start.mapv(|value| value.abs().max(1.0));
    let bounds = (&start - &spread, &start + &spread);

    let solver = ParticleSwarm::new(bounds, SWARM_SIZE);

    let mut executor =
        Executor::new(search, solver).configure(|state| state.max_iters(max_iters));
    if log_to_screen {
        executor = executor.add_observer(SlogLogger::term(), ObserverMode::Always);
    }

    let mut result = executor.run().map_err(RunFailure::Solver)?;
    let best = result
        .state
        .take_best_individual()
        .ok_or(RunFailure::NoSolution)?;

    Ok((best.position, best.cost))
}

/// Builds the initial simplex for a Nelder-Mead search: the start point plus
/// one vertex per dimension, offset along that coordinate axis.
fn initial_simplex(start: &Array1<f64>) -> Vec<Array1<f64>> {
    let mut simplex = vec![start.clone()];
    for dimension in 0..start.len() {
        let mut vertex = start.clone();
        vertex[dimension] += 0.25 * vertex[dimension].abs().max(0.5);
        simplex.push(vertex);
    }
    simplex
}
