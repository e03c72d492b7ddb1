//! Covariate model contract.
//!
//! A covariate model assumes that the individual parameters ψ follow a
//! population distribution that is conditional on the model parameters ϑ and
//! the individual covariates χ. To keep the inter-individual fluctuation
//! distribution reusable across covariate structures, the dependence is
//! recast as a covariate-independent distribution of fluctuations η with
//! parameters θ, together with two deterministic maps
//!
//! ```text
//! θ = f(ϑ)
//! ψ = g(ϑ, η, χ)
//! ```
//!
//! Implementors of [`CovariateModel`] provide `f` and `g` along with their
//! sensitivities. Concrete variants (identity, linear, power-law, ...) are
//! interchangeable plug-ins; population models select one at construction
//! time and only ever talk to the trait.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::ValidationError;

/// Deterministic mapping between population and individual parameters.
///
/// All operations are pure functions of their inputs. Dimensions follow the
/// conventions: `p` model parameters ϑ, `n` individuals, `c` covariates per
/// individual, and `p'` population parameters θ.
pub trait CovariateModel {
    /// Computes the individual parameters ψ.
    ///
    /// # Arguments
    /// * `parameters` - Model parameters ϑ of length `p`
    /// * `eta` - Inter-individual fluctuations η of length `n`
    /// * `covariates` - Individual covariates χ of shape `(n, c)`
    ///
    /// # Returns
    /// * `Array1<f64>` - Individual parameters ψ of length `n`
    fn compute_individual_parameters(
        &self,
        parameters: &ArrayView1<f64>,
        eta: &ArrayView1<f64>,
        covariates: &ArrayView2<f64>,
    ) -> Array1<f64>;

    /// Computes ψ together with its sensitivities.
    ///
    /// The sensitivity matrix has shape `(n, p + 1)`: the first `p` columns
    /// hold the partial derivatives of ψ with respect to ϑ and the last
    /// column holds the derivative with respect to the relevant η.
    fn compute_individual_sensitivities(
        &self,
        parameters: &ArrayView1<f64>,
        eta: &ArrayView1<f64>,
        covariates: &ArrayView2<f64>,
    ) -> (Array1<f64>, Array2<f64>);

    /// Computes the population parameters θ of the η-distribution.
    ///
    /// # Arguments
    /// * `parameters` - Model parameters ϑ of length `p`
    ///
    /// # Returns
    /// * `Array1<f64>` - Population parameters θ of length `p'`
    fn compute_population_parameters(&self, parameters: &ArrayView1<f64>) -> Array1<f64>;

    /// Computes θ together with its sensitivities of shape `(p', p)`.
    fn compute_population_sensitivities(
        &self,
        parameters: &ArrayView1<f64>,
    ) -> (Array1<f64>, Array2<f64>);

    /// Returns the names of the model parameters ϑ in index order.
    fn parameter_names(&self) -> Vec<String>;

    /// Renames the model parameters.
    ///
    /// # Arguments
    /// * `names` - One name per parameter, or `None` to reset to defaults
    ///
    /// # Errors
    /// Returns [`ValidationError::ParameterCount`] if the number of names
    /// does not match [`CovariateModel::n_parameters`].
    fn set_parameter_names(&mut self, names: Option<Vec<String>>) -> Result<(), ValidationError>;

    /// Returns the number of model parameters `p`.
    fn n_parameters(&self) -> usize;
}
