//! Optimisation control for maximum-a-posteriori inference.
//!
//! The [`OptimisationController`] orchestrates repeated, independent MAP
//! searches over a user-supplied log-posterior. It owns the batch
//! configuration (parameter fixing, reparameterising transform, optimiser
//! choice, number of runs and their start points) and aggregates the
//! successful runs into one tidy result table. Configuration is validated at
//! the call that introduces it; `run` itself never fails — individual run
//! failures are logged and dropped.

use std::sync::Arc;

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::ValidationError;
use crate::objective::{LogPdf, ReducedLogPdf};
use crate::optim::error::RunFailure;
use crate::optim::optimizer::{MapSearch, ObjectiveHandle, Optimiser};
use crate::optim::results::{OptimisationRecord, OptimisationResults, RunRecord};
use crate::optim::transformation::Transformation;

/// Default number of optimisation runs of a fresh controller.
const DEFAULT_N_RUNS: usize = 10;

/// Half-width of the spread the default start points are drawn from.
const DEFAULT_SPREAD: f64 = 2.0;

/// An active parameter reduction: the mask and the values the masked
/// parameters are held at. Shared by reference with the per-worker adapters.
#[derive(Debug, Clone)]
struct Fixing {
    mask: Arc<Vec<bool>>,
    values: Arc<Vec<f64>>,
}

/// Manages a batch of independent MAP optimisation runs.
///
/// The controller is a configure-then-run state machine and is re-enterable:
/// the configuration can be changed and `run` invoked again. Reconfiguring
/// concurrently with an in-flight `run` call is not supported; callers
/// serialise configuration and execution.
pub struct OptimisationController {
    log_pdf: Arc<dyn LogPdf + Send + Sync>,
    full_parameter_names: Vec<String>,
    free_parameter_names: Vec<String>,
    fixing: Option<Fixing>,
    transform: Option<Transformation>,
    optimiser: Optimiser,
    n_runs: usize,
    initial_points: Array2<f64>,
    parallel: bool,
    log_to_screen: bool,
    seed: Option<u64>,
}

impl OptimisationController {
    /// Creates a controller for the given log-posterior.
    ///
    /// Defaults: no parameters fixed, no transform, Nelder-Mead, ten runs,
    /// start points drawn uniformly from a broad spread around the origin.
    ///
    /// # Arguments
    /// * `log_pdf` - The objective to maximise; shared with the run workers
    pub fn new(log_pdf: Arc<dyn LogPdf + Send + Sync>) -> Self {
        let full_parameter_names = log_pdf.parameter_names();
        let n_parameters = log_pdf.n_parameters();

        let mut controller = Self {
            log_pdf,
            free_parameter_names: full_parameter_names.clone(),
            full_parameter_names,
            fixing: None,
            transform: None,
            optimiser: Optimiser::default(),
            n_runs: DEFAULT_N_RUNS,
            initial_points: Array2::zeros((0, 0)),
            parallel: true,
            log_to_screen: false,
            seed: None,
        };
        controller.initial_points = controller.draw_initial_points(DEFAULT_N_RUNS, n_parameters);
        controller
    }

    /// Fixes a subset of the parameters to constant values.
    ///
    /// The mask has one flag per parameter of the unreduced log-pdf; `true`
    /// marks a parameter as fixed. Values are assigned to the fixed
    /// parameters in index order. An all-`false` mask clears any previous
    /// fixing. The free-parameter names are recomputed, the initial points
    /// are redrawn for the new dimensionality, and a transform whose
    /// dimensionality no longer matches is cleared — never silently kept at
    /// the wrong dimension.
    ///
    /// # Arguments
    /// * `mask` - One flag per unreduced parameter
    /// * `values` - One value per `true` entry in the mask
    ///
    /// # Errors
    /// Returns a [`ValidationError`] if the mask length does not match the
    /// number of log-pdf parameters, or the number of values does not match
    /// the number of fixed parameters.
    pub fn fix_parameters(&mut self, mask: &[bool], values: &[f64]) -> Result<(), ValidationError> {
        let n_parameters = self.log_pdf.n_parameters();
        if mask.len() != n_parameters {
            return Err(ValidationError::MaskLength {
                expected: n_parameters,
                found: mask.len(),
            });
        }

        let n_fixed = mask.iter().filter(|&&fixed| fixed).count();
        if values.len() != n_fixed {
            return Err(ValidationError::FixedValueCount {
                expected: n_fixed,
                found: values.len(),
            });
        }

        self.fixing = (n_fixed > 0).then(|| Fixing {
            mask: Arc::new(mask.to_vec()),
            values: Arc::new(values.to_vec()),
        });

        self.free_parameter_names = self
            .full_parameter_names
            .iter()
            .zip(mask.iter())
            .filter(|(_, &fixed)| !fixed)
            .map(|(name, _)| name.clone())
            .collect();

        let n_free = self.free_parameter_names.len();
        if let Some(transform) = &self.transform {
            if transform.n_parameters() != n_free {
                log::debug!(
                    "clearing transform of dimension {} after fixing parameters: {} parameters remain free",
                    transform.n_parameters(),
                    n_free
                );
                self.transform = None;
            }
        }

        self.initial_points = self.draw_initial_points(self.n_runs, n_free);

        Ok(())
    }

    /// Sets the number of independent optimisation runs.
    ///
    /// The initial-points matrix is redrawn with one row per run.
    ///
    /// # Errors
    /// Returns [`ValidationError::NoRuns`] if `n_runs` is zero.
    pub fn set_n_runs(&mut self, n_runs: usize) -> Result<(), ValidationError> {
        if n_runs < 1 {
            return Err(ValidationError::NoRuns);
        }

        self.n_runs = n_runs;
        self.initial_points = self.draw_initial_points(n_runs, self.free_parameter_names.len());

        Ok(())
    }

    /// Selects the optimisation algorithm used by subsequent runs.
    ///
    /// Algorithm identifiers can also be parsed from strings via
    /// [`Optimiser`]'s `FromStr`, which rejects unrecognised names with a
    /// [`ValidationError`].
    pub fn set_optimiser(&mut self, optimiser: Optimiser) {
        self.optimiser = optimiser;
    }

    /// Sets a reparameterising transform over the free parameters.
    ///
    /// # Errors
    /// Returns [`ValidationError::TransformDimension`] if the transform's
    /// dimensionality does not equal the current free-parameter count.
    pub fn set_transform(&mut self, transform: Transformation) -> Result<(), ValidationError> {
        let n_free = self.free_parameter_names.len();
        if transform.n_parameters() != n_free {
            return Err(ValidationError::TransformDimension {
                expected: n_free,
                found: transform.n_parameters(),
            });
        }

        self.transform = Some(transform);
        Ok(())
    }

    /// Overrides the start points of the runs.
    ///
    /// # Errors
    /// Returns [`ValidationError::InitialPointsShape`] if the matrix is not
    /// of shape `(n_runs, free-parameter count)`.
    pub fn set_initial_points(&mut self, points: Array2<f64>) -> Result<(), ValidationError> {
        let expected = (self.n_runs, self.free_parameter_names.len());
        if points.dim() != expected {
            return Err(ValidationError::InitialPointsShape {
                expected_rows: expected.0,
                expected_cols: expected.1,
                found_rows: points.nrows(),
                found_cols: points.ncols(),
            });
        }

        self.initial_points = points;
        Ok(())
    }

    /// Seeds the default start-point draws and redraws the current matrix.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = Some(seed);
        self.initial_points =
            self.draw_initial_points(self.n_runs, self.free_parameter_names.len());
    }

    /// Enables or disables parallel execution of the runs.
    pub fn set_parallel(&mut self, parallel: bool) {
        self.parallel = parallel;
    }

    /// Enables or disables per-iteration optimiser logging to the terminal.
    pub fn set_log_to_screen(&mut self, log_to_screen: bool) {
        self.log_to_screen = log_to_screen;
    }

    /// Returns the names of the free (not fixed) parameters, in the order of
    /// the unreduced log-pdf.
    pub fn free_parameter_names(&self) -> &[String] {
        &self.free_parameter_names
    }

    /// Returns the full parameter-name list of the unreduced log-pdf.
    pub fn parameter_names(&self) -> &[String] {
        &self.full_parameter_names
    }

    /// Returns the number of configured runs.
    pub fn n_runs(&self) -> usize {
        self.n_runs
    }

    /// Returns the start points, one row per run.
    pub fn initial_points(&self) -> &Array2<f64> {
        &self.initial_points
    }

    /// Returns the active transform, if any.
    pub fn transform(&self) -> Option<&Transformation> {
        self.transform.as_ref()
    }

    /// Returns the selected optimisation algorithm.
    pub fn optimiser(&self) -> Optimiser {
        self.optimiser
    }

    /// Executes the configured batch of independent MAP searches.
    ///
    /// Each run starts from its row of the initial-points matrix and searches
    /// until the algorithm converges or `n_max_iterations` is reached,
    /// whichever happens first. Runs are independent and, by default,
    /// executed in parallel; a run that fails (optimiser error, panic, or a
    /// non-finite best score) is logged and excluded from the table without
    /// affecting its siblings.
    ///
    /// The returned table has one row per (free parameter, successful run)
    /// pair. Run indices are 1-based and contiguous in invocation order
    /// regardless of which runs failed; callers detect partial failure by
    /// comparing the table's run indices against
    /// [`OptimisationController::n_runs`].
    ///
    /// # Arguments
    /// * `n_max_iterations` - Iteration cap per run
    pub fn run(&self, n_max_iterations: u64) -> OptimisationResults {
        let starts: Vec<Array1<f64>> = self
            .initial_points
            .axis_iter(Axis(0))
            .map(|row| row.to_owned())
            .collect();

        let outcomes: Vec<Result<RunRecord, RunFailure>> = if self.parallel && self.n_runs > 1 {
            starts
                .par_iter()
                .enumerate()
                .map(|(index, start)| self.execute_run(index, start, n_max_iterations))
                .collect()
        } else {
            starts
                .iter()
                .enumerate()
                .map(|(index, start)| self.execute_run(index, start, n_max_iterations))
                .collect()
        };

        let mut results = OptimisationResults::default();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(record) => {
                    for (name, &estimate) in
                        self.free_parameter_names.iter().zip(record.estimate.iter())
                    {
                        results.push(OptimisationRecord {
                            parameter: name.clone(),
                            estimate,
                            score: record.score,
                            run: record.run,
                        });
                    }
                }
                Err(failure) => {
                    log::warn!(
                        "optimisation run {} of {} failed and was dropped: {failure}",
                        index + 1,
                        self.n_runs
                    );
                }
            }
        }

        results
    }

    /// Executes a single run against a private objective instance.
    fn execute_run(
        &self,
        index: usize,
        start: &Array1<f64>,
        n_max_iterations: u64,
    ) -> Result<RunRecord, RunFailure> {
        // Each worker gets its own adapter; only the wrapped log-pdf, mask
        // and fixed values are shared.
        let objective = match &self.fixing {
            Some(fixing) => ObjectiveHandle::Reduced(ReducedLogPdf::new(
                Arc::clone(&self.log_pdf),
                Arc::clone(&fixing.mask),
                Arc::clone(&fixing.values),
            )?),
            None => ObjectiveHandle::Full(Arc::clone(&self.log_pdf)),
        };

        let search_start = match &self.transform {
            Some(transform) => transform.to_search(&start.view()),
            None => start.clone(),
        };

        let (estimate, score) = self.optimiser.minimise(
            MapSearch::new(objective, self.transform.clone()),
            search_start,
            n_max_iterations,
            self.log_to_screen,
        )?;

        let estimate = match &self.transform {
            Some(transform) => transform.to_model(&estimate.view()),
            None => estimate,
        };

        Ok(RunRecord {
            run: index + 1,
            start: start.clone(),
            estimate,
            score,
        })
    }

    /// Draws a fresh start-point matrix from the default spread.
    fn draw_initial_points(&self, n_runs: usize, n_free: usize) -> Array2<f64> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Array2::from_shape_fn((n_runs, n_free), |_| {
            rng.gen_range(-DEFAULT_SPREAD..DEFAULT_SPREAD)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayView1;

    /// Isotropic Gaussian log-pdf centred at the origin.
    struct SphericalGaussian {
        n: usize,
    }

    impl LogPdf for SphericalGaussian {
        fn evaluate(&self, parameters: &ArrayView1<f64>) -> f64 {
            -0.5 * parameters.iter().map(|value| value * value).sum::<f64>()
        }

        fn n_parameters(&self) -> usize {
            self.n
        }

        fn parameter_names(&self) -> Vec<String> {
            vec![
                "myokit.tumour_volume".to_string(),
                "myokit.drug_concentration".to_string(),
                "myokit.kappa".to_string(),
                "myokit.lambda_0".to_string(),
                "myokit.lambda_1".to_string(),
                "Sigma base".to_string(),
            ]
        }
    }

    fn controller() -> OptimisationController {
        OptimisationController::new(Arc::new(SphericalGaussian { n: 6 }))
    }

    #[test]
    fn test_fix_parameters_bad_mask() {
        let mut controller = controller();

        let result = controller.fix_parameters(&[false, true, true], &[1.0, 1.0]);
        assert_eq!(
            result.err(),
            Some(ValidationError::MaskLength {
                expected: 6,
                found: 3
            })
        );
    }

    #[test]
    fn test_fix_parameters_bad_values() {
        let mut controller = controller();

        let mask = [false, true, true, false, true, true];
        let result = controller.fix_parameters(&mask, &[1.0; 6]);
        assert_eq!(
            result.err(),
            Some(ValidationError::FixedValueCount {
                expected: 4,
                found: 6
            })
        );
    }

    #[test]
    fn test_fix_parameters_names() {
        let mut controller = controller();

        // Fix all but parameters 0 and 3.
        let mask = [false, true, true, false, true, true];
        controller.fix_parameters(&mask, &[1.0; 4]).unwrap();

        assert_eq!(
            controller.free_parameter_names(),
            &["myokit.tumour_volume", "myokit.lambda_0"]
        );

        // Fix a different subset.
        let mask = [false, true, false, true, true, false];
        controller.fix_parameters(&mask, &[1.0; 3]).unwrap();

        assert_eq!(
            controller.free_parameter_names(),
            &["myokit.tumour_volume", "myokit.kappa", "Sigma base"]
        );
    }

    #[test]
    fn test_set_n_runs() {
        let mut controller = controller();

        controller.set_n_runs(5).unwrap();
        assert_eq!(controller.n_runs(), 5);
        assert_eq!(controller.initial_points().dim(), (5, 6));

        // Only the latest value counts.
        controller.set_n_runs(20).unwrap();
        assert_eq!(controller.n_runs(), 20);
        assert_eq!(controller.initial_points().dim(), (20, 6));

        // Fixing parameters resizes the columns.
        let mask = [true, true, true, false, false, false];
        controller.fix_parameters(&mask, &[1.0; 3]).unwrap();
        assert_eq!(controller.initial_points().dim(), (20, 3));

        assert_eq!(controller.set_n_runs(0), Err(ValidationError::NoRuns));
    }

    #[test]
    fn test_set_transform_bad_dimension() {
        let mut controller = controller();

        let result = controller.set_transform(Transformation::Log(10));
        assert_eq!(
            result.err(),
            Some(ValidationError::TransformDimension {
                expected: 6,
                found: 10
            })
        );
        assert!(controller.transform().is_none());
    }

    #[test]
    fn test_fix_parameters_clears_stale_transform() {
        let mut controller = controller();

        controller.set_transform(Transformation::Log(6)).unwrap();
        assert_eq!(controller.transform(), Some(&Transformation::Log(6)));

        // Reducing to one free parameter invalidates the transform.
        let mask = [false, true, true, true, true, true];
        controller.fix_parameters(&mask, &[1.0; 5]).unwrap();
        assert!(controller.transform().is_none());

        controller.set_transform(Transformation::Log(1)).unwrap();
        assert_eq!(controller.transform(), Some(&Transformation::Log(1)));
    }

    #[test]
    fn test_fix_parameters_keeps_matching_transform() {
        let mut controller = controller();

        let mask = [true, true, true, true, false, false];
        controller.fix_parameters(&mask, &[1.0; 4]).unwrap();
        controller.set_transform(Transformation::Log(2)).unwrap();

        // A different mask with the same free count keeps the transform.
        let mask = [false, false, true, true, true, true];
        controller.fix_parameters(&mask, &[1.0; 4]).unwrap();
        assert_eq!(controller.transform(), Some(&Transformation::Log(2)));
    }

    #[test]
    fn test_set_initial_points_bad_shape() {
        let mut controller = controller();
        controller.set_n_runs(3).unwrap();

        let result = controller.set_initial_points(Array2::zeros((3, 2)));
        assert_eq!(
            result.err(),
            Some(ValidationError::InitialPointsShape {
                expected_rows: 3,
                expected_cols: 6,
                found_rows: 3,
                found_cols: 2
            })
        );
    }

    #[test]
    fn test_seeded_draws_are_reproducible() {
        let mut first = controller();
        let mut second = controller();

        first.set_seed(7);
        second.set_seed(7);

        assert_eq!(first.initial_points(), second.initial_points());
    }
}
