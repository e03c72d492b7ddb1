//! Result tables for optimisation batches.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use ndarray::Array1;
use serde::Serialize;

use crate::error::ValidationError;

/// One completed optimisation run.
///
/// A record is created when a batch is configured, populated when the run
/// executes and immutable afterwards. Failed runs produce no record; their
/// absence from the result table is the failure signal.
#[derive(Debug, Clone)]
pub struct RunRecord {
    /// 1-based run index, assigned in invocation order
    pub run: usize,
    /// The run's starting point in model space
    pub start: Array1<f64>,
    /// The best parameter vector found, in model space
    pub estimate: Array1<f64>,
    /// The log-pdf score of the estimate (higher is better)
    pub score: f64,
}

/// One row of an optimisation result table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimisationRecord {
    /// Free-parameter name
    pub parameter: String,
    /// Estimated value of the parameter
    pub estimate: f64,
    /// Score of the run the estimate belongs to
    pub score: f64,
    /// 1-based index of the run the estimate belongs to
    pub run: usize,
}

/// A tidy table of MAP estimates across optimisation runs.
///
/// One row per (free parameter, successful run) pair; rows are ordered by
/// run index ascending and, within a run, by free-parameter name order. The
/// column set `{Parameter, Estimate, Score, Run}` is a stable contract
/// consumed by the plotting layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimisationResults {
    rows: Vec<OptimisationRecord>,
}

impl OptimisationResults {
    /// Returns the rows of the table.
    pub fn rows(&self) -> &[OptimisationRecord] {
        &self.rows
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table has no rows, i.e. every run failed.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the distinct parameter names in first-seen order.
    pub fn parameters(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.parameter.clone())
            .unique()
            .collect()
    }

    /// Returns the distinct run indices in ascending order.
    ///
    /// Comparing this against the number of requested runs detects partial
    /// failure.
    pub fn runs(&self) -> Vec<usize> {
        self.rows
            .iter()
            .map(|row| row.run)
            .unique()
            .sorted()
            .collect()
    }

    /// Returns the estimates of one parameter across runs, in run order.
    pub fn estimates(&self, parameter: &str) -> Vec<f64> {
        self.rows
            .iter()
            .filter(|row| row.parameter == parameter)
            .map(|row| row.estimate)
            .collect()
    }

    /// Returns the index of the run with the highest score.
    pub fn best_run(&self) -> Option<usize> {
        self.rows
            .iter()
            .max_by(|left, right| left.score.total_cmp(&right.score))
            .map(|row| row.run)
    }

    /// Produces a new table with parameters renamed via an old-name to
    /// new-name mapping.
    ///
    /// The mapping is validated up front; names that do not occur in the
    /// table are rejected rather than silently ignored.
    ///
    /// # Errors
    /// Returns [`ValidationError::UnknownParameter`] for mapping keys absent
    /// from the table.
    pub fn rename_parameters(
        &self,
        mapping: &HashMap<String, String>,
    ) -> Result<OptimisationResults, ValidationError> {
        let known: HashSet<&String> = self.rows.iter().map(|row| &row.parameter).collect();
        for old_name in mapping.keys() {
            if !known.contains(old_name) {
                return Err(ValidationError::UnknownParameter(old_name.clone()));
            }
        }

        let rows = self
            .rows
            .iter()
            .map(|row| OptimisationRecord {
                parameter: mapping
                    .get(&row.parameter)
                    .cloned()
                    .unwrap_or_else(|| row.parameter.clone()),
                ..row.clone()
            })
            .collect();

        Ok(OptimisationResults { rows })
    }

    /// Serialises the table to pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub(crate) fn push(&mut self, row: OptimisationRecord) {
        self.rows.push(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> OptimisationResults {
        let mut table = OptimisationResults::default();
        for run in [1, 3] {
            for (parameter, estimate) in [("Volume", 1.5), ("Clearance", 0.3)] {
                table.push(OptimisationRecord {
                    parameter: parameter.to_string(),
                    estimate,
                    score: -(run as f64),
                    run,
                });
            }
        }
        table
    }

    #[test]
    fn test_accessors() {
        let table = table();

        assert_eq!(table.len(), 4);
        assert_eq!(table.parameters(), vec!["Volume", "Clearance"]);
        assert_eq!(table.runs(), vec![1, 3]);
        assert_eq!(table.estimates("Volume"), vec![1.5, 1.5]);
        assert_eq!(table.best_run(), Some(1));
    }

    #[test]
    fn test_rename_parameters() {
        let table = table();

        let mapping =
            HashMap::from([("Volume".to_string(), "myokit.tumour_volume".to_string())]);
        let renamed = table.rename_parameters(&mapping).unwrap();

        assert_eq!(
            renamed.parameters(),
            vec!["myokit.tumour_volume", "Clearance"]
        );
        // The original table is untouched.
        assert_eq!(table.parameters(), vec!["Volume", "Clearance"]);
    }

    #[test]
    fn test_rename_parameters_unknown_name() {
        let table = table();

        let mapping = HashMap::from([("Elimination".to_string(), "ke".to_string())]);
        let result = table.rename_parameters(&mapping);

        assert_eq!(
            result.err(),
            Some(ValidationError::UnknownParameter("Elimination".to_string()))
        );
    }
}
