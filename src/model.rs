//! Mechanistic-model and error-model boundaries.
//!
//! The toolkit never integrates ODEs itself; mechanistic simulators are
//! consumed as black boxes through [`MechanisticModel`]. Likewise measurement
//! noise enters only through the [`ErrorModel`] trait. Both traits mirror the
//! collaborator interfaces the predictive and inference layers are written
//! against.

use std::collections::HashMap;

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;

use crate::error::{CapabilityError, ValidationError};

/// A single dose administration event.
///
/// The compound is administered at `start` as an infusion of the given
/// `duration` at a constant rate (`level`), so the administered amount is
/// `level * duration`. A `period` of zero means the dose is given once;
/// otherwise the event repeats every `period` time units `multiplier` times,
/// where a multiplier of zero means indefinite repetition.
#[derive(Debug, Clone, PartialEq)]
pub struct DoseEvent {
    level: f64,
    start: f64,
    duration: f64,
    period: f64,
    multiplier: usize,
}

impl DoseEvent {
    /// Creates a dose event from the administered amount.
    ///
    /// # Arguments
    /// * `amount` - Amount of compound administered per dose
    /// * `start` - Start time of the administration
    /// * `duration` - Duration of the administration (infusion length)
    /// * `period` - Periodicity of repeated administration; `0` for a single dose
    /// * `multiplier` - Number of administrations; `0` for indefinite repetition
    pub fn new(amount: f64, start: f64, duration: f64, period: f64, multiplier: usize) -> Self {
        Self {
            level: amount / duration,
            start,
            duration,
            period,
            multiplier,
        }
    }

    /// Returns the dose rate (amount per time unit).
    pub fn level(&self) -> f64 {
        self.level
    }

    /// Returns the start time of the administration.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Returns the duration of the administration.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Returns the administration period; `0` for a single dose.
    pub fn period(&self) -> f64 {
        self.period
    }

    /// Returns the number of administrations; `0` for indefinite repetition.
    pub fn multiplier(&self) -> usize {
        self.multiplier
    }
}

/// The schedule with which a compound is administered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DosingRegimen {
    events: Vec<DoseEvent>,
}

impl DosingRegimen {
    /// Creates an empty regimen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a dose event to the regimen.
    pub fn add_event(&mut self, event: DoseEvent) {
        self.events.push(event);
    }

    /// Returns the dose events in insertion order.
    pub fn events(&self) -> &[DoseEvent] {
        &self.events
    }
}

/// An ODE-based simulator of biomarker trajectories.
///
/// `simulate` is the single hot-path operation: it produces one deterministic
/// trajectory per model output over the requested time grid. The dosing hooks
/// have default implementations that fail with
/// [`CapabilityError::DosingUnsupported`]; models with an administration
/// compartment override them. Capability absence is therefore an error value
/// that callers can match on, never a null.
pub trait MechanisticModel {
    /// Solves the model over the given time grid.
    ///
    /// # Arguments
    /// * `parameters` - Model parameters of length [`MechanisticModel::n_parameters`]
    /// * `times` - Time points at which the outputs are evaluated
    ///
    /// # Returns
    /// * `Array2<f64>` - Trajectories of shape `(n_outputs, n_times)`
    fn simulate(&self, parameters: &ArrayView1<f64>, times: &[f64]) -> Array2<f64>;

    /// Returns the number of model parameters.
    fn n_parameters(&self) -> usize;

    /// Returns the number of model outputs.
    fn n_outputs(&self) -> usize;

    /// Returns the output names, in the row order of [`MechanisticModel::simulate`].
    fn outputs(&self) -> Vec<String>;

    /// Restricts or reorders the model outputs.
    ///
    /// # Errors
    /// Returns [`ValidationError::UnknownOutput`] for names the model does
    /// not provide.
    fn set_outputs(&mut self, outputs: &[String]) -> Result<(), ValidationError>;

    /// Returns the parameter names in index order.
    fn parameter_names(&self) -> Vec<String>;

    /// Renames parameters via an old-name to new-name mapping.
    ///
    /// The mapping is validated before it is applied: unknown source names
    /// are rejected rather than silently ignored.
    ///
    /// # Errors
    /// Returns [`ValidationError::UnknownParameter`] for names the model does
    /// not have.
    fn set_parameter_names(
        &mut self,
        mapping: &HashMap<String, String>,
    ) -> Result<(), ValidationError>;

    /// Returns the dosing regimen, or `None` if none has been set.
    ///
    /// # Errors
    /// Returns [`CapabilityError::DosingUnsupported`] if the model has no
    /// administration compartment.
    fn dosing_regimen(&self) -> Result<Option<&DosingRegimen>, CapabilityError> {
        Err(CapabilityError::DosingUnsupported)
    }

    /// Sets the dosing regimen with which the compound is administered.
    ///
    /// By default the dose is administered as a bolus injection, modelled as
    /// an infusion over a duration of `0.01` time units. Provide a `period`
    /// to repeat the administration, and `num` to cap the number of doses;
    /// a periodic regimen without `num` repeats indefinitely.
    ///
    /// # Errors
    /// Returns [`CapabilityError::DosingUnsupported`] if the model has no
    /// administration compartment.
    fn set_dosing_regimen(
        &mut self,
        dose: f64,
        start: f64,
        duration: Option<f64>,
        period: Option<f64>,
        num: Option<usize>,
    ) -> Result<(), CapabilityError> {
        let _ = (dose, start, duration, period, num);
        Err(CapabilityError::DosingUnsupported)
    }
}

/// A stochastic model of measurement noise around a deterministic trajectory.
pub trait ErrorModel {
    /// Draws noisy "measurements" around the model output.
    ///
    /// # Arguments
    /// * `parameters` - Error-model parameters of length [`ErrorModel::n_parameters`]
    /// * `model_output` - Deterministic trajectory of length `n_times`
    /// * `n_samples` - Number of draws per time point
    /// * `seed` - Optional seed for reproducible draws
    ///
    /// # Returns
    /// * `Array2<f64>` - Samples of shape `(n_times, n_samples)`
    ///
    /// # Errors
    /// Returns a [`ValidationError`] if the parameters are outside the
    /// model's admissible range.
    fn sample(
        &self,
        parameters: &ArrayView1<f64>,
        model_output: &ArrayView1<f64>,
        n_samples: usize,
        seed: Option<u64>,
    ) -> Result<Array2<f64>, ValidationError>;

    /// Returns the number of error-model parameters.
    fn n_parameters(&self) -> usize;

    /// Returns the parameter names in index order.
    fn parameter_names(&self) -> Vec<String>;
}

/// Gaussian measurement noise with a combined additive and relative width.
///
/// Samples are drawn from `N(y, sigma_base + sigma_rel * |y|)` around each
/// trajectory value `y`. The two parameters are `Sigma base` and
/// `Sigma rel.` in that order.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianErrorModel;

impl ErrorModel for GaussianErrorModel {
    fn sample(
        &self,
        parameters: &ArrayView1<f64>,
        model_output: &ArrayView1<f64>,
        n_samples: usize,
        seed: Option<u64>,
    ) -> Result<Array2<f64>, ValidationError> {
        let sigma_base = parameters[0];
        let sigma_rel = parameters[1];

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut samples = Array2::zeros((model_output.len(), n_samples));
        for (time_id, &value) in model_output.iter().enumerate() {
            let std_dev = sigma_base + sigma_rel * value.abs();
            let distribution = Normal::new(value, std_dev)
                .map_err(|_| ValidationError::NonPositiveStandardDeviation(std_dev))?;
            for sample_id in 0..n_samples {
                samples[[time_id, sample_id]] = rng.sample(distribution);
            }
        }

        Ok(samples)
    }

    fn n_parameters(&self) -> usize {
        2
    }

    fn parameter_names(&self) -> Vec<String> {
        vec!["Sigma base".to_string(), "Sigma rel.".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_dose_event_level() {
        let event = DoseEvent::new(2.0, 0.0, 0.5, 0.0, 1);
        assert_eq!(event.level(), 4.0);
        assert_eq!(event.duration(), 0.5);
    }

    #[test]
    fn test_gaussian_error_model_shape_and_seed() {
        let model = GaussianErrorModel;
        let output = arr1(&[1.0, 2.0, 3.0]);
        let parameters = arr1(&[0.1, 0.05]);

        let first = model
            .sample(&parameters.view(), &output.view(), 4, Some(42))
            .unwrap();
        let second = model
            .sample(&parameters.view(), &output.view(), 4, Some(42))
            .unwrap();

        assert_eq!(first.shape(), &[3, 4]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_gaussian_error_model_bad_sigma() {
        let model = GaussianErrorModel;
        let output = arr1(&[1.0]);
        let parameters = arr1(&[-1.0, 0.0]);

        let result = model.sample(&parameters.view(), &output.view(), 1, None);
        assert!(matches!(
            result,
            Err(ValidationError::NonPositiveStandardDeviation(_))
        ));
    }
}
