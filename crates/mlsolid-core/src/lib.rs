//! Core domain models and types for mlsolid
//!
//! This crate contains the data structures and domain logic behind the
//! experiment tracker: runs and experiments, typed metric accumulators,
//! artifacts and the versioned model registry.

pub mod artifact;
pub mod error;
pub mod metric;
pub mod model;
pub mod run;
pub mod types;

// Re-exports for convenience
pub use artifact::{Artifact, ContentType, SavedArtifact};
pub use error::{Result, SolidError};
pub use metric::{Metric, MetricKind, MetricSeries, MetricValue};
pub use model::{ModelEntry, ModelRegistry};
pub use run::{Experiment, Run};
pub use types::{distinct_tags, normalize_id, TagIndex, Tags};
