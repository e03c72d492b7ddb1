//! Reparameterising transforms for optimisation.
//!
//! A transform maps the free-parameter vector between model space and the
//! optimiser's internal search space. Searching in a transformed space can
//! enforce constraints (positivity, boundedness) or improve conditioning
//! while the reported estimates keep their original meaning: start points
//! are pushed through [`Transformation::to_search`] before a run and the
//! optimiser's result is pulled back through [`Transformation::to_model`].

use serde::Serialize;

use ndarray::{Array1, ArrayView1};

/// Element-wise transform of a free-parameter vector of known dimension.
///
/// # Variants
/// * `Identity(n)` - No-op transform; useful as an explicit default
/// * `Log(n)` - Search in log space; constrains parameters to be positive
/// * `Logit(n)` - Search in logit space; constrains parameters to (0, 1)
/// * `Scale(n, factor)` - Multiply by a constant, non-zero factor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Transformation {
    Identity(usize),
    Log(usize),
    Logit(usize),
    Scale(usize, f64),
}

impl Transformation {
    /// Returns the dimension of the vectors the transform operates on.
    pub fn n_parameters(&self) -> usize {
        match self {
            Transformation::Identity(n) => *n,
            Transformation::Log(n) => *n,
            Transformation::Logit(n) => *n,
            Transformation::Scale(n, _) => *n,
        }
    }

    /// Maps a model-space vector into search space.
    pub fn to_search(&self, parameters: &ArrayView1<f64>) -> Array1<f64> {
        match self {
            Transformation::Identity(_) => parameters.to_owned(),
            Transformation::Log(_) => parameters.mapv(f64::ln),
            Transformation::Logit(_) => parameters.mapv(|p| (p / (1.0 - p)).ln()),
            Transformation::Scale(_, factor) => parameters.mapv(|value| value * factor),
        }
    }

    /// Maps a search-space vector back into model space.
    ///
    /// Inverse of [`Transformation::to_search`].
    pub fn to_model(&self, parameters: &ArrayView1<f64>) -> Array1<f64> {
        match self {
            Transformation::Identity(_) => parameters.to_owned(),
            Transformation::Log(_) => parameters.mapv(f64::exp),
            Transformation::Logit(_) => parameters.mapv(|x| 1.0 / (1.0 + (-x).exp())),
            Transformation::Scale(_, factor) => parameters.mapv(|value| value / factor),
        }
    }
}
