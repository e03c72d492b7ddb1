//! pharmfit
//!
//! This library provides building blocks for fitting mechanistic
//! pharmacokinetic/pharmacodynamic models to clinical and preclinical
//! biomarker data:
//! - Orchestrating repeated maximum-a-posteriori searches over a log-posterior
//! - Reducing objective dimensionality by fixing parameters
//! - Reparameterising transforms and derivative-free optimisers
//! - Sampling synthetic measurements from predictive models
//! - Covariate-model and simulator contracts shared across the toolkit
//!
//! Mechanistic ODE simulation, data loading and plotting are external
//! collaborators; they are consumed through the traits in [`model`] and the
//! tidy result tables produced here.

#![warn(unused_imports)]

/// Commonly used types and functionality re-exported for convenience
pub mod prelude {
    pub use crate::covariate::*;
    pub use crate::error::*;
    pub use crate::model::*;
    pub use crate::objective::*;
    pub use crate::optim::*;
    pub use crate::predictive::*;
}

/// Shared error taxonomy
pub mod error;

/// Log-pdf contracts and dimensionality reduction
pub mod objective;

/// Covariate model contract
pub mod covariate;

/// Mechanistic-model and error-model boundaries
pub mod model;

/// Predictive sampling models
pub mod predictive;

/// MAP optimisation control
pub mod optim {
    pub use crate::optim::controller::*;
    pub use crate::optim::error::*;
    pub use crate::optim::optimizer::*;
    pub use crate::optim::results::*;
    pub use crate::optim::transformation::*;
    pub use argmin::core::CostFunction;

    pub mod controller;
    pub mod error;
    pub mod optimizer;
    pub mod results;
    pub mod transformation;
}
