//! Log-pdf contracts and dimensionality reduction.
//!
//! The optimisation and sampling layers only ever see scalar-valued objective
//! functions through the [`LogPdf`] trait: a callable mapping a fixed-length
//! parameter vector to a score where higher is better. Priors additionally
//! expose sampling through [`LogPrior`].
//!
//! [`ReducedLogPdf`] wraps any log-pdf and fixes a subset of its parameters to
//! constant values, exposing a lower-dimensional view of the same objective.

use std::cell::RefCell;
use std::sync::Arc;

use ndarray::{Array1, ArrayView1};
use rand::RngCore;

use crate::error::ValidationError;

/// A scalar-valued objective function over a fixed-length parameter vector.
///
/// Implementors are typically log-posteriors, log-likelihoods or log-priors.
/// Higher return values indicate more probable parameters.
pub trait LogPdf {
    /// Evaluates the log-pdf at the given parameter vector.
    ///
    /// # Arguments
    /// * `parameters` - Parameter vector of length [`LogPdf::n_parameters`]
    ///
    /// # Returns
    /// * `f64` - The log-probability density (up to an additive constant)
    fn evaluate(&self, parameters: &ArrayView1<f64>) -> f64;

    /// Returns the number of parameters the log-pdf is defined over.
    fn n_parameters(&self) -> usize;

    /// Returns the parameter names in index order.
    ///
    /// Defaults to `"Param 1"` through `"Param n"` when the implementor does
    /// not carry meaningful names.
    fn parameter_names(&self) -> Vec<String> {
        (1..=self.n_parameters())
            .map(|index| format!("Param {index}"))
            .collect()
    }
}

/// A log-pdf that can also be sampled from, e.g. a log-prior distribution.
pub trait LogPrior: LogPdf {
    /// Draws one parameter vector from the distribution.
    ///
    /// # Arguments
    /// * `rng` - Random number generator used for the draw
    ///
    /// # Returns
    /// * `Array1<f64>` - A sample of length [`LogPdf::n_parameters`]
    fn sample(&self, rng: &mut dyn RngCore) -> Array1<f64>;
}

/// A wrapper around a [`LogPdf`] that fixes a subset of its parameters.
///
/// This reduces the parameter dimensionality of the wrapped log-pdf at the
/// cost of holding the masked parameters at constant values. Free values
/// passed to [`LogPdf::evaluate`] are scattered into the non-fixed positions
/// in ascending index order.
///
/// The adapter keeps one full-length scratch buffer that is mutated in place
/// on every call, so a single instance must not be invoked from multiple
/// threads concurrently (it is deliberately `Send` but not `Sync`). Workers
/// that need the same reduction each construct their own adapter; this is
/// cheap because the wrapped log-pdf, mask and fixed values are shared by
/// reference.
pub struct ReducedLogPdf {
    log_pdf: Arc<dyn LogPdf + Send + Sync>,
    mask: Arc<Vec<bool>>,
    buffer: RefCell<Array1<f64>>,
    n_free: usize,
}

impl ReducedLogPdf {
    /// Creates a reduced view of `log_pdf` with the masked parameters fixed.
    ///
    /// # Arguments
    /// * `log_pdf` - The objective to wrap
    /// * `mask` - One flag per wrapped parameter; `true` marks it as fixed
    /// * `values` - One value per `true` entry in the mask, in index order
    ///
    /// # Errors
    /// Returns a [`ValidationError`] if the mask length does not match the
    /// wrapped parameter count, or if the number of values does not match the
    /// number of fixed parameters.
    pub fn new(
        log_pdf: Arc<dyn LogPdf + Send + Sync>,
        mask: Arc<Vec<bool>>,
        values: Arc<Vec<f64>>,
    ) -> Result<Self, ValidationError> {
        if mask.len() != log_pdf.n_parameters() {
            return Err(ValidationError::MaskLength {
                expected: log_pdf.n_parameters(),
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

        // Pre-fill the fixed slots once; they never change over the adapter's
        // lifetime.
        let mut buffer = Array1::zeros(mask.len());
        let mut next_value = 0;
        for (slot, &fixed) in buffer.iter_mut().zip(mask.iter()) {
            if fixed {
                *slot = values[next_value];
                next_value += 1;
            }
        }

        let n_free = mask.len() - n_fixed;

        Ok(Self {
            log_pdf,
            mask,
            buffer: RefCell::new(buffer),
            n_free,
        })
    }
}

impl LogPdf for ReducedLogPdf {
    fn evaluate(&self, parameters: &ArrayView1<f64>) -> f64 {
        debug_assert_eq!(parameters.len(), self.n_free);

        let mut buffer = self.buffer.borrow_mut();
        let mut free = parameters.iter();
        for (slot, &fixed) in buffer.iter_mut().zip(self.mask.iter()) {
            if !fixed {
                if let Some(&value) = free.next() {
                    *slot = value;
                }
            }
        }

        self.log_pdf.evaluate(&buffer.view())
    }

    /// Returns the number of free parameters of the reduced log-pdf.
    fn n_parameters(&self) -> usize {
        self.n_free
    }

    fn parameter_names(&self) -> Vec<String> {
        self.log_pdf
            .parameter_names()
            .into_iter()
            .zip(self.mask.iter())
            .filter(|(_, &fixed)| !fixed)
            .map(|(name, _)| name)
            .collect()
    }
}
