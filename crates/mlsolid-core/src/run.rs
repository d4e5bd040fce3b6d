//! Runs and experiments

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::artifact::SavedArtifact;
use crate::error::{Result, SolidError};
use crate::metric::Metric;
use crate::types::normalize_id;

/// A single training or evaluation run
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    /// Normalized, unique run name
    pub name: String,
    /// Experiment this run belongs to
    pub experiment_id: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Metrics keyed by metric name
    pub metrics: HashMap<String, Metric>,
    /// Artifact pointers keyed by artifact name
    pub artifacts: HashMap<String, SavedArtifact>,
}

impl Run {
    /// Create a new, empty run stamped with the current time.
    ///
    /// Both identifiers are normalized. An empty run name or experiment id is
    /// rejected, as is a run name containing `:`, the key separator of the
    /// metric and artifact logs.
    pub fn new(name: &str, experiment_id: &str) -> Result<Self> {
        Self::at(name, experiment_id, Utc::now())
    }

    /// Create a run with an explicit creation time
    pub fn at(name: &str, experiment_id: &str, timestamp: DateTime<Utc>) -> Result<Self> {
        let name = normalize_id(name);
        if name.is_empty() {
            return Err(SolidError::BadRequest("run name cannot be empty".to_string()));
        }
        if name.contains(':') {
            return Err(SolidError::InvalidInput(format!(
                "run name <{}> cannot contain ':'",
                name
            )));
        }

        let experiment_id = normalize_id(experiment_id);
        if experiment_id.is_empty() {
            return Err(SolidError::BadRequest(
                "experiment id cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            name,
            experiment_id,
            timestamp,
            metrics: HashMap::new(),
            artifacts: HashMap::new(),
        })
    }

    /// Names of all metrics attached to the run, sorted
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.metrics.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(&normalize_id(name))
    }

    pub fn artifact(&self, name: &str) -> Option<&SavedArtifact> {
        self.artifacts.get(name)
    }
}

/// An experiment with its runs loaded
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    pub id: String,
    pub runs: Vec<Run>,
}

impl Experiment {
    pub fn new(id: impl Into<String>, mut runs: Vec<Run>) -> Self {
        runs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.name.cmp(&b.name)));
        Self { id: id.into(), runs }
    }

    pub fn run_names(&self) -> Vec<&str> {
        self.runs.iter().map(|r| r.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_run_identifiers_are_normalized() {
        let run = Run::new("  Linear Regression 1 ", "Exp 1").unwrap();
        assert_eq!(run.name, "linear-regression-1");
        assert_eq!(run.experiment_id, "exp-1");
        assert!(run.metrics.is_empty());
        assert!(run.artifacts.is_empty());
    }

    #[test]
    fn test_run_requires_identifiers() {
        assert!(matches!(Run::new(" ", "exp1"), Err(SolidError::BadRequest(_))));
        assert!(matches!(Run::new("run1", ""), Err(SolidError::BadRequest(_))));
    }

    #[test]
    fn test_run_name_rejects_key_separator() {
        assert!(matches!(Run::new("a:run1", "exp1"), Err(SolidError::InvalidInput(_))));
        assert!(matches!(Run::new(" A : B ", "exp1"), Err(SolidError::InvalidInput(_))));
        assert!(Run::new("run1", "team:exp1").is_ok());
    }

    #[test]
    fn test_metric_lookup_normalizes_name() {
        let mut run = Run::new("run1", "exp1").unwrap();
        let metric = Metric::new("mse", crate::metric::MetricKind::Float);
        run.metrics.insert(metric.name().to_string(), metric);

        assert!(run.metric(" MSE ").is_some());
        assert_eq!(run.metric_names(), vec!["mse"]);
    }

    #[test]
    fn test_experiment_orders_runs_by_creation() {
        let now = Utc::now();
        let late = Run::at("b", "exp", now).unwrap();
        let early = Run::at("a", "exp", now - Duration::seconds(5)).unwrap();

        let exp = Experiment::new("exp", vec![late, early]);
        assert_eq!(exp.run_names(), vec!["a", "b"]);
    }
}
