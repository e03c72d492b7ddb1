//! Shared error taxonomy.
//!
//! Two error families are distinguished so that callers can tell "bad
//! arguments" apart from "wrong model type":
//!
//! - [`ValidationError`] covers configuration and input shape mismatches and
//!   is raised synchronously at the call that introduced the bad input.
//! - [`CapabilityError`] signals that a collaborator does not support the
//!   requested operation, e.g. setting a dosing regimen on a purely
//!   pharmacodynamic model without an administration compartment.
//!
//! Per-run optimisation failures are a third, separate concern and live in
//! [`crate::optim::RunFailure`]; they are never surfaced as errors of the
//! batch.

use thiserror::Error;

/// Configuration and input shape errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Length of mask ({found}) has to match the number of log-pdf parameters ({expected})")]
    MaskLength { expected: usize, found: usize },
    #[error("There have to be as many fixed values ({found}) as fixed parameters ({expected})")]
    FixedValueCount { expected: usize, found: usize },
    #[error("The length of parameters ({found}) does not match n_parameters ({expected})")]
    ParameterCount { expected: usize, found: usize },
    #[error("The number of runs has to be at least 1")]
    NoRuns,
    #[error("The dimensionality of the transform ({found}) has to match the number of free parameters ({expected})")]
    TransformDimension { expected: usize, found: usize },
    #[error("Unknown optimiser `{0}`")]
    UnknownOptimiser(String),
    #[error("Initial points have the wrong shape: expected ({expected_rows}, {expected_cols}), found ({found_rows}, {found_cols})")]
    InitialPointsShape {
        expected_rows: usize,
        expected_cols: usize,
        found_rows: usize,
        found_cols: usize,
    },
    #[error("The final dose time has to be positive")]
    NegativeFinalTime,
    #[error("Wrong number of error models: one has to be provided for each of the {expected} mechanistic outputs, found {found}")]
    ErrorModelCount { expected: usize, found: usize },
    #[error("The dimensionality of the log-prior ({found}) has to match the number of predictive model parameters ({expected})")]
    PriorDimension { expected: usize, found: usize },
    #[error("Unknown parameter `{0}`")]
    UnknownParameter(String),
    #[error("Unknown output `{0}`")]
    UnknownOutput(String),
    #[error("Standard deviation has to be positive, got {0}")]
    NonPositiveStandardDeviation(f64),
}

/// An operation requires a feature the collaborator does not support.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error(
        "The mechanistic model does not support dosing regimens. This may be \
         because the model is purely pharmacodynamic and has no administration \
         compartment"
    )]
    DosingUnsupported,
}
