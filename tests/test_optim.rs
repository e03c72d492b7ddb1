//! Tests for the optimisation controller.
//!
//! The controller is exercised end to end against a Gaussian log-posterior
//! with a known maximum: result-table schema, parameter fixing, transforms,
//! both supported optimisers, and the isolation of failing runs.

#[cfg(test)]
mod test_optim {
    use std::sync::Arc;

    use approx::assert_relative_eq;
    use ndarray::{arr2, ArrayView1};
    use pharmfit::prelude::*;
    use pretty_assertions::assert_eq;

    /// Makes the warnings for dropped runs visible under `--nocapture`.
    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Gaussian log-posterior with independent components and unit width.
    struct GaussianLogPosterior {
        means: Vec<f64>,
        names: Vec<String>,
    }

    impl GaussianLogPosterior {
        fn new(means: &[f64], names: &[&str]) -> Self {
            Self {
                means: means.to_vec(),
                names: names.iter().map(|name| name.to_string()).collect(),
            }
        }
    }

    impl LogPdf for GaussianLogPosterior {
        fn evaluate(&self, parameters: &ArrayView1<f64>) -> f64 {
            -0.5 * parameters
                .iter()
                .zip(self.means.iter())
                .map(|(value, mean)| (value - mean) * (value - mean))
                .sum::<f64>()
        }

        fn n_parameters(&self) -> usize {
            self.means.len()
        }

        fn parameter_names(&self) -> Vec<String> {
            self.names.clone()
        }
    }

    /// Log-pdf that is undefined (NaN) left of a cliff. Runs started deep
    /// inside the undefined region can never produce a finite score.
    struct CliffLogPdf;

    impl LogPdf for CliffLogPdf {
        fn evaluate(&self, parameters: &ArrayView1<f64>) -> f64 {
            if parameters[0] < -50.0 {
                f64::NAN
            } else {
                -0.5 * parameters[0] * parameters[0]
            }
        }

        fn n_parameters(&self) -> usize {
            1
        }
    }

    fn posterior() -> Arc<dyn LogPdf + Send + Sync> {
        Arc::new(GaussianLogPosterior::new(
            &[0.3, -0.2, 0.5, 1.0, -0.8, 0.1],
            &[
                "myokit.tumour_volume",
                "myokit.drug_concentration",
                "myokit.kappa",
                "myokit.lambda_0",
                "myokit.lambda_1",
                "Sigma base",
            ],
        ))
    }

    #[test]
    fn test_run_returns_tidy_table() {
        // ARRANGE
        let mut controller = OptimisationController::new(posterior());
        controller.set_seed(1);
        controller.set_n_runs(3).unwrap();

        // ACT
        let results = controller.run(200);

        // ASSERT
        let parameters = results.parameters();
        assert_eq!(parameters.len(), 6);
        assert_eq!(parameters[0], "myokit.tumour_volume");
        assert_eq!(parameters[5], "Sigma base");

        assert_eq!(results.runs(), vec![1, 2, 3]);
        assert_eq!(results.len(), 6 * 3);

        // Within a run, rows follow the free-parameter name order.
        let first_run: Vec<_> = results
            .rows()
            .iter()
            .filter(|row| row.run == 1)
            .map(|row| row.parameter.clone())
            .collect();
        assert_eq!(first_run, controller.free_parameter_names());
    }

    #[test]
    fn test_run_with_fixed_parameters() {
        // ARRANGE: fix all but parameters 0 and 3.
        let mut controller = OptimisationController::new(posterior());
        controller.set_seed(2);
        let mask = [false, true, true, false, true, true];
        controller.fix_parameters(&mask, &[1.0; 4]).unwrap();
        controller.set_n_runs(3).unwrap();
        assert_eq!(controller.initial_points().dim(), (3, 2));

        // ACT
        let results = controller.run(300);

        // ASSERT
        let parameters = results.parameters();
        assert_eq!(parameters, vec!["myokit.tumour_volume", "myokit.lambda_0"]);
        assert_eq!(results.runs(), vec![1, 2, 3]);

        // The searches converge to the free components' means.
        for row in results.rows() {
            let target = if row.parameter == "myokit.tumour_volume" {
                0.3
            } else {
                1.0
            };
            assert_relative_eq!(row.estimate, target, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_failed_runs_are_dropped_not_raised() {
        // ARRANGE: run 2 starts deep inside the undefined region and cannot
        // escape it within the simplex's reach.
        init_logging();
        let mut controller = OptimisationController::new(Arc::new(CliffLogPdf));
        controller.set_n_runs(3).unwrap();
        controller
            .set_initial_points(arr2(&[[0.5], [-2000.0], [0.8]]))
            .unwrap();

        // ACT
        let results = controller.run(50);

        // ASSERT: the failing run is absent, its siblings are not.
        assert_eq!(results.runs(), vec![1, 3]);
        assert_eq!(results.parameters(), vec!["Param 1"]);
        for row in results.rows() {
            assert!(row.score.is_finite());
        }
    }

    #[test]
    fn test_all_runs_failing_yields_empty_table() {
        init_logging();
        let mut controller = OptimisationController::new(Arc::new(CliffLogPdf));
        controller.set_n_runs(2).unwrap();
        controller
            .set_initial_points(arr2(&[[-1000.0], [-3000.0]]))
            .unwrap();

        let results = controller.run(50);

        assert!(results.is_empty());
        assert_eq!(results.runs(), Vec::<usize>::new());
    }

    #[test]
    fn test_run_with_log_transform() {
        // ARRANGE: positive means, searched in log space.
        let log_pdf = Arc::new(GaussianLogPosterior::new(&[2.0, 0.5], &["k_e", "V_c"]));
        let mut controller = OptimisationController::new(log_pdf);
        controller.set_n_runs(2).unwrap();
        controller
            .set_initial_points(arr2(&[[1.0, 1.0], [3.0, 0.2]]))
            .unwrap();
        controller.set_transform(Transformation::Log(2)).unwrap();

        // ACT
        let results = controller.run(500);

        // ASSERT: estimates are reported in model space.
        assert_eq!(results.runs(), vec![1, 2]);
        for row in results.rows() {
            let target = if row.parameter == "k_e" { 2.0 } else { 0.5 };
            assert_relative_eq!(row.estimate, target, epsilon = 5e-2);
        }
    }

    #[test]
    fn test_particle_swarm() {
        // ARRANGE
        let log_pdf = Arc::new(GaussianLogPosterior::new(&[0.3, -0.2], &["k_a", "k_e"]));
        let mut controller = OptimisationController::new(log_pdf);
        controller.set_optimiser(Optimiser::ParticleSwarm);
        controller.set_n_runs(2).unwrap();
        controller
            .set_initial_points(arr2(&[[0.0, 0.0], [0.5, -0.5]]))
            .unwrap();

        // ACT
        let results = controller.run(200);

        // ASSERT
        assert_eq!(results.runs(), vec![1, 2]);
        for row in results.rows() {
            let target = if row.parameter == "k_a" { 0.3 } else { -0.2 };
            assert_relative_eq!(row.estimate, target, epsilon = 0.2);
        }
    }

    #[test]
    fn test_serial_execution_matches_schema() {
        let mut controller = OptimisationController::new(posterior());
        controller.set_seed(3);
        controller.set_parallel(false);
        controller.set_n_runs(2).unwrap();

        let results = controller.run(100);

        assert_eq!(results.runs(), vec![1, 2]);
        assert_eq!(results.len(), 6 * 2);
    }

    #[test]
    fn test_rerun_after_reconfiguration() {
        // The controller is re-enterable: configure, run, reconfigure, run.
        let mut controller = OptimisationController::new(posterior());
        controller.set_seed(4);
        controller.set_n_runs(2).unwrap();

        let first = controller.run(100);
        assert_eq!(first.parameters().len(), 6);

        let mask = [true, true, true, true, true, false];
        controller.fix_parameters(&mask, &[1.0; 5]).unwrap();
        let second = controller.run(100);

        assert_eq!(second.parameters(), vec!["Sigma base"]);
        assert_eq!(second.runs(), vec![1, 2]);
    }
}
