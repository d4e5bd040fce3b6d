//! Test fixtures

use mlsolid_core::{Artifact, MetricValue};
use mlsolid_service::{ArtifactUpload, MetricInput};

/// Metric input of float values
pub fn float_metric(name: &str, values: &[f64]) -> MetricInput {
    MetricInput::new(name, values.iter().copied().map(MetricValue::Float).collect())
}

/// Text artifact with the given body
pub fn text_artifact(name: &str, body: &str) -> Artifact {
    Artifact::text(name, body).expect("Failed to build text artifact")
}

/// Model checkpoint artifact
pub fn checkpoint(name: &str, bytes: &[u8]) -> Artifact {
    Artifact::checkpoint(name, bytes.to_vec()).expect("Failed to build checkpoint")
}

/// Artifact as a caller would send it on run creation
pub fn upload(name: &str, content_type: &str, body: &[u8]) -> ArtifactUpload {
    ArtifactUpload {
        name: name.to_string(),
        content_type: content_type.to_string(),
        content: body.to_vec(),
    }
}

pub fn tags(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
