//! Run service
//!
//! Creates runs, logs metrics against them and answers run and experiment
//! queries. Run and experiment ids are normalized on the way in, so callers
//! may pass display names.

use async_trait::async_trait;
use mlsolid_core::{normalize_id, Artifact, Experiment, Metric, Run};
use mlsolid_db::SolidStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::artifact::ArtifactCoordinator;
use crate::dto::{CreateRunRequest, MetricInput};
use crate::error::{ServiceError, ServiceResult};

/// Trait for run and experiment operations
#[async_trait]
pub trait RunService: Send + Sync {
    /// Create a run with optional initial metrics and artifacts
    async fn create_run(&self, request: CreateRunRequest) -> ServiceResult<Run>;

    /// Load a run with its metrics and artifact pointers
    async fn get_run(&self, run_id: &str) -> ServiceResult<Run>;

    /// Load several runs; an empty id list loads every run
    async fn list_runs(&self, run_ids: &[String]) -> ServiceResult<Vec<Run>>;

    /// Run ids of an experiment
    async fn list_experiment_runs(&self, exp_id: &str) -> ServiceResult<Vec<String>>;

    /// Ids of every experiment
    async fn list_experiments(&self) -> ServiceResult<Vec<String>>;

    /// Load an experiment with its runs
    async fn get_experiment(&self, exp_id: &str) -> ServiceResult<Experiment>;

    /// Append metric values to an existing run, returning the touched metrics
    async fn add_metrics(&self, run_id: &str, metrics: Vec<MetricInput>) -> ServiceResult<Vec<Metric>>;
}

/// Default implementation of RunService
pub struct DefaultRunService {
    store: SolidStore,
    artifacts: Arc<ArtifactCoordinator>,
}

impl DefaultRunService {
    pub fn new(store: SolidStore, artifacts: Arc<ArtifactCoordinator>) -> Self {
        Self { store, artifacts }
    }

    /// Fold metric inputs into `metrics`, merging repeated names
    fn merge_metrics(metrics: &mut HashMap<String, Metric>, inputs: Vec<MetricInput>) -> ServiceResult<Vec<String>> {
        let mut touched = Vec::new();

        for input in inputs {
            let name = normalize_id(&input.name);
            match metrics.get_mut(&name) {
                Some(metric) => {
                    for value in input.values {
                        metric.add(value)?;
                    }
                }
                None => {
                    metrics.insert(name.clone(), Metric::with_pending(&name, input.values)?);
                }
            }

            if !touched.contains(&name) {
                touched.push(name);
            }
        }

        Ok(touched)
    }
}

#[async_trait]
impl RunService for DefaultRunService {
    #[instrument(skip(self, request), fields(run = %request.name, experiment = %request.experiment_id))]
    async fn create_run(&self, request: CreateRunRequest) -> ServiceResult<Run> {
        let mut run = Run::new(&request.name, &request.experiment_id)?;

        let artifacts = request
            .artifacts
            .into_iter()
            .map(Artifact::try_from)
            .collect::<ServiceResult<Vec<_>>>()?;
        if !artifacts.is_empty() && !self.artifacts.is_configured() {
            return Err(ServiceError::NotInitialized(
                "object store is not configured".to_string(),
            ));
        }

        if self.store.run_exists(&run.name).await? {
            return Err(ServiceError::AlreadyInUse(format!("run <{}>", run.name)));
        }

        Self::merge_metrics(&mut run.metrics, request.metrics)?;
        self.store.create_run(&run).await?;
        for metric in run.metrics.values_mut() {
            metric.commit();
        }

        info!("Created run <{}> in experiment <{}>", run.name, run.experiment_id);

        for saved in self.artifacts.upload(&run.name, artifacts).await? {
            run.artifacts.insert(saved.name.clone(), saved);
        }

        Ok(run)
    }

    #[instrument(skip(self))]
    async fn get_run(&self, run_id: &str) -> ServiceResult<Run> {
        Ok(self.store.run(&normalize_id(run_id)).await?)
    }

    #[instrument(skip(self), fields(count = run_ids.len()))]
    async fn list_runs(&self, run_ids: &[String]) -> ServiceResult<Vec<Run>> {
        let ids = if run_ids.is_empty() {
            self.store.run_ids().await?
        } else {
            run_ids.iter().map(|id| normalize_id(id)).collect()
        };

        let runs = self.store.runs(&ids).await?;
        debug!("Loaded {} of {} requested run(s)", runs.len(), ids.len());
        Ok(runs)
    }

    #[instrument(skip(self))]
    async fn list_experiment_runs(&self, exp_id: &str) -> ServiceResult<Vec<String>> {
        let exp_id = normalize_id(exp_id);
        if !self.store.experiment_exists(&exp_id).await? {
            return Err(ServiceError::NotFound(format!("experiment <{}>", exp_id)));
        }

        Ok(self.store.experiment_run_ids(&exp_id).await?)
    }

    #[instrument(skip(self))]
    async fn list_experiments(&self) -> ServiceResult<Vec<String>> {
        Ok(self.store.experiment_ids().await?)
    }

    #[instrument(skip(self))]
    async fn get_experiment(&self, exp_id: &str) -> ServiceResult<Experiment> {
        Ok(self.store.experiment(&normalize_id(exp_id)).await?)
    }

    #[instrument(skip(self, metrics), fields(count = metrics.len()))]
    async fn add_metrics(&self, run_id: &str, metrics: Vec<MetricInput>) -> ServiceResult<Vec<Metric>> {
        let run_id = normalize_id(run_id);
        if !self.store.run_exists(&run_id).await? {
            return Err(ServiceError::NotFound(format!("run <{}>", run_id)));
        }

        // Existing logs fix the type new values must match
        let mut logged = self.store.metrics(&run_id).await?;
        let touched = Self::merge_metrics(&mut logged, metrics)?;

        let mut updated: Vec<Metric> = touched
            .iter()
            .filter_map(|name| logged.remove(name))
            .collect();

        self.store.append_metrics(&run_id, &updated).await?;
        for metric in &mut updated {
            metric.commit();
        }

        info!("Logged {} metric(s) for run <{}>", updated.len(), run_id);
        Ok(updated)
    }
}
