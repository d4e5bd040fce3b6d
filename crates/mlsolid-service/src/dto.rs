//! Data Transfer Objects (DTOs) for service operations
//!
//! Request types carry plain identifiers and values into the services;
//! the view types flatten domain objects into a stable JSON shape.

use chrono::{DateTime, Utc};
use mlsolid_core::{Artifact, Experiment, Metric, MetricKind, MetricValue, ModelEntry, ModelRegistry, Run, SavedArtifact};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ServiceError, ServiceResult};

// ============================================================================
// Run Requests
// ============================================================================

/// Values to log for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricInput {
    pub name: String,
    pub values: Vec<MetricValue>,
}

impl MetricInput {
    pub fn new(name: impl Into<String>, values: Vec<MetricValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Artifact content as it arrives from a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactUpload {
    pub name: String,
    pub content_type: String,
    #[serde(default)]
    pub content: Vec<u8>,
}

impl TryFrom<ArtifactUpload> for Artifact {
    type Error = ServiceError;

    fn try_from(upload: ArtifactUpload) -> ServiceResult<Self> {
        Ok(Artifact::new(upload.name, &upload.content_type, upload.content)?)
    }
}

/// Request to create a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRunRequest {
    pub name: String,
    pub experiment_id: String,
    #[serde(default)]
    pub metrics: Vec<MetricInput>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactUpload>,
}

impl CreateRunRequest {
    pub fn new(name: impl Into<String>, experiment_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            experiment_id: experiment_id.into(),
            metrics: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn metric(mut self, input: MetricInput) -> Self {
        self.metrics.push(input);
        self
    }

    pub fn artifact(mut self, upload: ArtifactUpload) -> Self {
        self.artifacts.push(upload);
        self
    }
}

// ============================================================================
// Artifact Responses
// ============================================================================

/// Outcome of an add-artifacts call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddArtifactsResponse {
    /// Pointers written by this call
    pub uploaded: Vec<SavedArtifact>,
    /// Names already recorded for the run
    pub skipped: Vec<String>,
}

// ============================================================================
// Views
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricView {
    pub kind: MetricKind,
    pub values: Vec<MetricValue>,
    pub last: Option<MetricValue>,
}

impl From<&Metric> for MetricView {
    fn from(metric: &Metric) -> Self {
        Self {
            kind: metric.kind(),
            values: metric.vals(),
            last: metric.last_val(),
        }
    }
}

/// A run flattened for output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunView {
    pub name: String,
    pub experiment_id: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricView>,
    pub artifacts: Vec<SavedArtifact>,
}

impl From<&Run> for RunView {
    fn from(run: &Run) -> Self {
        let mut artifacts: Vec<SavedArtifact> = run.artifacts.values().cloned().collect();
        artifacts.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            name: run.name.clone(),
            experiment_id: run.experiment_id.clone(),
            timestamp: run.timestamp,
            metrics: run
                .metrics
                .iter()
                .map(|(name, metric)| (name.clone(), MetricView::from(metric)))
                .collect(),
            artifacts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentView {
    pub id: String,
    pub runs: Vec<RunView>,
}

impl From<&Experiment> for ExperimentView {
    fn from(experiment: &Experiment) -> Self {
        Self {
            id: experiment.id.clone(),
            runs: experiment.runs.iter().map(RunView::from).collect(),
        }
    }
}

/// A registry entry with its version made explicit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedModel {
    pub version: usize,
    pub url: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRegistryView {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub latest_version: usize,
    pub models: Vec<VersionedModel>,
    pub tags: BTreeMap<String, Vec<usize>>,
}

impl From<&ModelRegistry> for ModelRegistryView {
    fn from(registry: &ModelRegistry) -> Self {
        Self {
            name: registry.name().to_string(),
            created_at: registry.created_at(),
            latest_version: registry.latest_version(),
            models: registry
                .models()
                .iter()
                .enumerate()
                .map(|(i, entry)| VersionedModel::new(i + 1, entry))
                .collect(),
            tags: registry
                .tags()
                .iter()
                .map(|(tag, versions)| (tag.clone(), versions.clone()))
                .collect(),
        }
    }
}

impl VersionedModel {
    pub fn new(version: usize, entry: &ModelEntry) -> Self {
        Self {
            version,
            url: entry.url.clone(),
            tags: entry.tags.clone(),
        }
    }
}
