//! Predictive sampling models.
//!
//! A [`PredictiveModel`] composes one mechanistic simulator with one error
//! model per mechanistic output and generates synthetic biomarker
//! "measurements": the mechanistic model is solved once for the requested
//! parameters and times, and stochastic observations are drawn around the
//! deterministic trajectories. [`PriorPredictiveModel`] layers a log-prior on
//! top, drawing a fresh parameter set for every requested sample.
//!
//! Results leave this module only as tidy long-format tables; the plotting
//! layer consumes those tables and nothing else.

use itertools::Itertools;
use ndarray::{s, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::error::{CapabilityError, ValidationError};
use crate::model::{ErrorModel, MechanisticModel};
use crate::objective::LogPrior;

/// One synthetic measurement drawn from a predictive model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictiveSample {
    /// 1-based identifier of the draw this measurement belongs to
    pub sample_id: usize,
    /// Name of the measured biomarker (mechanistic model output)
    pub biomarker: String,
    /// Measurement time
    pub time: f64,
    /// Measured value
    pub sample: f64,
}

/// A tidy long-format table of synthetic measurements.
///
/// Rows are ordered by biomarker, then time, then sample id. The column set
/// `{Sample ID, Biomarker, Time, Sample}` is a stable contract consumed by
/// the plotting layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PredictiveSamples {
    rows: Vec<PredictiveSample>,
}

impl PredictiveSamples {
    /// Returns the rows of the table.
    pub fn rows(&self) -> &[PredictiveSample] {
        &self.rows
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the distinct sample ids in ascending order.
    pub fn sample_ids(&self) -> Vec<usize> {
        self.rows.iter().map(|row| row.sample_id).unique().sorted().collect()
    }

    /// Returns the distinct biomarker names in first-seen order.
    pub fn biomarkers(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.biomarker.clone())
            .unique()
            .collect()
    }

    /// Serialises the table to pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub(crate) fn push(&mut self, row: PredictiveSample) {
        self.rows.push(row);
    }
}

/// One administration row of a dosing-regimen table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoseAdministration {
    /// Time of the administration
    pub time: f64,
    /// Duration of the administration
    pub duration: f64,
    /// Administered amount of the compound
    pub dose: f64,
}

/// A dosing-event table with columns `{Time, Duration, Dose}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DosingTable {
    rows: Vec<DoseAdministration>,
}

impl DosingTable {
    /// Returns the rows of the table.
    pub fn rows(&self) -> &[DoseAdministration] {
        &self.rows
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the administration times in row order.
    pub fn times(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.time).collect()
    }

    fn push(&mut self, row: DoseAdministration) {
        self.rows.push(row);
    }
}

/// Predicts the change of observable biomarkers over time.
///
/// The model composes a [`MechanisticModel`] with one [`ErrorModel`] per
/// mechanistic output and samples biomarker values that may be measured in
/// preclinical or clinical experiments. Its parameter vector is the
/// mechanistic parameters followed by each output's error-model parameters,
/// contiguously and in output order.
pub struct PredictiveModel {
    mechanistic: Box<dyn MechanisticModel + Send + Sync>,
    error_models: Vec<Box<dyn ErrorModel + Send + Sync>>,
    parameter_names: Vec<String>,
}

impl PredictiveModel {
    /// Composes a mechanistic model with per-output error models.
    ///
    /// # Arguments
    /// * `mechanistic` - The mechanistic simulator
    /// * `error_models` - One error model per mechanistic output, in output
    ///   order
    /// * `outputs` - Optional output selection applied to the mechanistic
    ///   model before composition
    ///
    /// # Errors
    /// Returns a [`ValidationError`] if an output name is unknown or the
    /// number of error models does not match the number of outputs.
    pub fn new(
        mut mechanistic: Box<dyn MechanisticModel + Send + Sync>,
        error_models: Vec<Box<dyn ErrorModel + Send + Sync>>,
        outputs: Option<&[String]>,
    ) -> Result<Self, ValidationError> {
        if let Some(outputs) = outputs {
            mechanistic.set_outputs(outputs)?;
        }

        let n_outputs = mechanistic.n_outputs();
        if error_models.len() != n_outputs {
            return Err(ValidationError::ErrorModelCount {
                expected: n_outputs,
                found: error_models.len(),
            });
        }

        // Error-model parameter names are qualified by their output so the
        // composed name list stays unambiguous across outputs.
        let mut parameter_names = mechanistic.parameter_names();
        for (output, error_model) in mechanistic.outputs().iter().zip(error_models.iter()) {
            for name in error_model.parameter_names() {
                parameter_names.push(format!("{output} {name}"));
            }
        }

        Ok(Self {
            mechanistic,
            error_models,
            parameter_names,
        })
    }

    /// Returns the total number of model parameters.
    pub fn n_parameters(&self) -> usize {
        self.parameter_names.len()
    }

    /// Returns the parameter names: mechanistic first, then per-output error
    /// parameters.
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameter_names.clone()
    }

    /// Returns the number of model outputs.
    pub fn n_outputs(&self) -> usize {
        self.mechanistic.n_outputs()
    }

    /// Returns the output (biomarker) names.
    pub fn output_names(&self) -> Vec<String> {
        self.mechanistic.outputs()
    }

    /// Samples "measurements" of the biomarkers from the predictive model.
    ///
    /// The mechanistic model is solved once for the provided parameters over
    /// the sorted, de-duplicated times, and `n_samples` observations per time
    /// point are drawn from each output's error model around the
    /// deterministic trajectory.
    ///
    /// # Arguments
    /// * `parameters` - Full parameter vector of length [`PredictiveModel::n_parameters`]
    /// * `times` - Times at which the virtual measurements are performed
    /// * `n_samples` - Draws per time point; defaults to one
    /// * `seed` - Optional seed for reproducible draws
    ///
    /// # Errors
    /// Returns [`ValidationError::ParameterCount`] if the parameter vector
    /// has the wrong length, or an error-model validation failure.
    pub fn sample(
        &self,
        parameters: &ArrayView1<f64>,
        times: &[f64],
        n_samples: Option<usize>,
        seed: Option<u64>,
    ) -> Result<PredictiveSamples, ValidationError> {
        if parameters.len() != self.n_parameters() {
            return Err(ValidationError::ParameterCount {
                expected: self.n_parameters(),
                found: parameters.len(),
            });
        }

        let mut times = times.to_vec();
        times.sort_by(|left, right| left.total_cmp(right));
        times.dedup();

        let n_samples = n_samples.unwrap_or(1);

        // Split into the mechanistic sub-vector and the contiguous
        // error-model slices.
        let n_mechanistic = self.mechanistic.n_parameters();
        let mechanistic_parameters = parameters.slice(s![..n_mechanistic]);

        let trajectories = self.mechanistic.simulate(&mechanistic_parameters, &times);
        let output_names = self.mechanistic.outputs();

        let mut table = PredictiveSamples::default();
        let mut start = n_mechanistic;
        for (output_id, error_model) in self.error_models.iter().enumerate() {
            let end = start + error_model.n_parameters();
            let draws = error_model.sample(
                &parameters.slice(s![start..end]),
                &trajectories.row(output_id),
                n_samples,
                seed,
            )?;
            start = end;

            for (time_id, &time) in times.iter().enumerate() {
                for sample_id in 1..=n_samples {
                    table.push(PredictiveSample {
                        sample_id,
                        biomarker: output_names[output_id].clone(),
                        time,
                        sample: draws[[time_id, sample_id - 1]],
                    });
                }
            }
        }

        Ok(table)
    }

    /// Returns the dosing regimen as a `{Time, Duration, Dose}` table.
    ///
    /// Periodic dose events are expanded into one row per administration. An
    /// event that repeats indefinitely is truncated at `final_time`; without
    /// a `final_time` only its first administration is registered. Returns
    /// `None` if the mechanistic model does not support dosing or no regimen
    /// has been set.
    ///
    /// # Arguments
    /// * `final_time` - Time up to which dose events are registered
    ///
    /// # Errors
    /// Returns [`ValidationError::NegativeFinalTime`] if `final_time` is
    /// negative.
    pub fn get_dosing_regimen(
        &self,
        final_time: Option<f64>,
    ) -> Result<Option<DosingTable>, ValidationError> {
        if let Some(final_time) = final_time {
            if final_time < 0.0 {
                return Err(ValidationError::NegativeFinalTime);
            }
        }

        let regimen = match self.mechanistic.dosing_regimen() {
            Ok(Some(regimen)) => regimen,
            // No regimen set, or no administration compartment at all.
            Ok(None) | Err(_) => return Ok(None),
        };

        let horizon = final_time.unwrap_or(f64::INFINITY);

        let mut table = DosingTable::default();
        for event in regimen.events() {
            if event.start() > horizon {
                continue;
            }

            let amount = event.level() * event.duration();
            if event.period() == 0.0 {
                table.push(DoseAdministration {
                    time: event.start(),
                    duration: event.duration(),
                    dose: amount,
                });
                continue;
            }

            let n_doses = if event.multiplier() > 0 {
                event.multiplier()
            } else if horizon.is_finite() {
                // Every administration up to and including the horizon.
                ((horizon - event.start()) / event.period()).floor() as usize + 1
            } else {
                // Indefinite regimen without a horizon: register the first
                // administration only.
                1
            };

            for dose_id in 0..n_doses {
                let time = event.start() + dose_id as f64 * event.period();
                if time > horizon {
                    break;
                }
                table.push(DoseAdministration {
                    time,
                    duration: event.duration(),
                    dose: amount,
                });
            }
        }

        if table.is_empty() {
            return Ok(None);
        }

        Ok(Some(table))
    }

    /// Sets the dosing regimen with which the compound is administered.
    ///
    /// Delegates to the mechanistic model; see
    /// [`MechanisticModel::set_dosing_regimen`] for the argument semantics.
    ///
    /// # Errors
    /// Returns [`CapabilityError::DosingUnsupported`] if the mechanistic
    /// model has no administration compartment.
    pub fn set_dosing_regimen(
        &mut self,
        dose: f64,
        start: f64,
        duration: Option<f64>,
        period: Option<f64>,
        num: Option<usize>,
    ) -> Result<(), CapabilityError> {
        self.mechanistic
            .set_dosing_regimen(dose, start, duration, period, num)
    }
}

/// Predicts biomarker values from the parameter distribution prior to
/// inference.
///
/// For each requested sample a parameter vector is drawn from the log-prior
/// and handed to the wrapped [`PredictiveModel`]. A prior predictive model
/// may be used to check whether the prior assumptions lead to a predictive
/// distribution that encapsulates the expected measurement values.
pub struct PriorPredictiveModel {
    predictive_model: PredictiveModel,
    log_prior: Box<dyn LogPrior + Send + Sync>,
}

impl PriorPredictiveModel {
    /// Wraps a predictive model with a prior over its parameters.
    ///
    /// # Errors
    /// Returns [`ValidationError::PriorDimension`] if the prior's
    /// dimensionality does not match the predictive model's parameter count.
    pub fn new(
        predictive_model: PredictiveModel,
        log_prior: Box<dyn LogPrior + Send + Sync>,
    ) -> Result<Self, ValidationError> {
        if log_prior.n_parameters() != predictive_model.n_parameters() {
            return Err(ValidationError::PriorDimension {
                expected: predictive_model.n_parameters(),
                found: log_prior.n_parameters(),
            });
        }

        Ok(Self {
            predictive_model,
            log_prior,
        })
    }

    /// Returns the output (biomarker) names.
    pub fn output_names(&self) -> Vec<String> {
        self.predictive_model.output_names()
    }

    /// Returns the dosing regimen of the wrapped predictive model.
    pub fn get_dosing_regimen(
        &self,
        final_time: Option<f64>,
    ) -> Result<Option<DosingTable>, ValidationError> {
        self.predictive_model.get_dosing_regimen(final_time)
    }

    /// Sets the dosing regimen of the wrapped predictive model.
    pub fn set_dosing_regimen(
        &mut self,
        dose: f64,
        start: f64,
        duration: Option<f64>,
        period: Option<f64>,
        num: Option<usize>,
    ) -> Result<(), CapabilityError> {
        self.predictive_model
            .set_dosing_regimen(dose, start, duration, period, num)
    }

    /// Samples "measurements" of the biomarkers from the prior predictive
    /// model.
    ///
    /// For each of the `n_samples` draws a parameter vector is sampled from
    /// the log-prior and the predictive model is sampled once with it. When a
    /// seed is supplied, draw `i` uses the seed `seed + i`, so each draw is
    /// reproducible on its own without correlating the draws.
    ///
    /// # Arguments
    /// * `times` - Times at which the virtual measurements are performed
    /// * `n_samples` - Number of prior draws; defaults to one
    /// * `seed` - Optional base seed for reproducible draws
    pub fn sample(
        &self,
        times: &[f64],
        n_samples: Option<usize>,
        seed: Option<u64>,
    ) -> Result<PredictiveSamples, ValidationError> {
        let n_samples = n_samples.unwrap_or(1);

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut table = PredictiveSamples::default();
        for draw in 1..=n_samples {
            let parameters = self.log_prior.sample(&mut rng);
            let draw_seed = seed.map(|base| base + draw as u64);

            let draws =
                self.predictive_model
                    .sample(&parameters.view(), times, Some(1), draw_seed)?;
            for row in draws.rows() {
                table.push(PredictiveSample {
                    sample_id: draw,
                    biomarker: row.biomarker.clone(),
                    time: row.time,
                    sample: row.sample,
                });
            }
        }

        Ok(table)
    }
}
