//! Artifact service
//!
//! Sequences blob uploads and pointer writes. A blob is always stored before
//! its pointer, so a reader never sees a pointer without bytes behind it; a
//! failure between the two steps leaves an orphaned blob instead.

use async_trait::async_trait;
use futures::future::join_all;
use mlsolid_core::artifact::artifacts_by_name;
use mlsolid_core::{normalize_id, Artifact, SavedArtifact};
use mlsolid_db::{ObjectReader, ObjectStore, SolidStore};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::dto::AddArtifactsResponse;
use crate::error::{ServiceError, ServiceResult};

/// Resolved artifact pointer plus a stream over its bytes
pub struct ArtifactStream {
    pub artifact: SavedArtifact,
    pub reader: ObjectReader,
}

impl fmt::Debug for ArtifactStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactStream")
            .field("artifact", &self.artifact)
            .finish_non_exhaustive()
    }
}

/// Uploads artifact batches and records their pointers
#[derive(Clone)]
pub struct ArtifactCoordinator {
    store: SolidStore,
    objects: Option<Arc<dyn ObjectStore>>,
}

impl ArtifactCoordinator {
    /// Create a coordinator; `objects` is `None` until an object store is configured
    pub fn new(store: SolidStore, objects: Option<Arc<dyn ObjectStore>>) -> Self {
        Self { store, objects }
    }

    pub fn is_configured(&self) -> bool {
        self.objects.is_some()
    }

    fn objects(&self) -> ServiceResult<&Arc<dyn ObjectStore>> {
        self.objects
            .as_ref()
            .ok_or_else(|| ServiceError::NotInitialized("object store is not configured".to_string()))
    }

    /// Upload a batch and write pointers for every blob that landed.
    ///
    /// Failed uploads do not stop the batch. When any item failed, the
    /// successful pointers are still written and a
    /// [`ServiceError::PartialFailure`] naming the failed items is returned.
    pub async fn upload(&self, run_id: &str, artifacts: Vec<Artifact>) -> ServiceResult<Vec<SavedArtifact>> {
        if artifacts.is_empty() {
            return Ok(Vec::new());
        }
        let objects = self.objects()?;

        let uploads = artifacts.iter().map(|artifact| async move {
            let key = objects.generate_key(artifact.name());
            debug!("Uploading artifact <{}> as {}", artifact.name(), key);
            let result = objects.put(&key, artifact.content().to_vec()).await;
            (artifact, result)
        });

        let mut saved = Vec::new();
        let mut failed = Vec::new();
        let mut reasons = Vec::new();
        for (artifact, result) in join_all(uploads).await {
            match result {
                Ok(key) => saved.push(SavedArtifact::new(artifact, key)),
                Err(e) => {
                    warn!("Upload of artifact <{}> for run <{}> failed: {}", artifact.name(), run_id, e);
                    failed.push(artifact.name().to_string());
                    reasons.push(format!("{}: {}", artifact.name(), e));
                }
            }
        }

        self.store.set_artifacts(run_id, &saved).await?;

        if !failed.is_empty() {
            return Err(ServiceError::PartialFailure {
                message: format!(
                    "{} of {} artifact upload(s) failed for run <{}>: {}",
                    failed.len(),
                    artifacts.len(),
                    run_id,
                    reasons.join("; ")
                ),
                failed,
            });
        }

        Ok(saved)
    }

    /// Resolve a pointer and open its blob
    pub async fn open(&self, run_id: &str, name: &str) -> ServiceResult<ArtifactStream> {
        let objects = self.objects()?;
        let artifact = self.store.artifact(run_id, name).await?;
        let reader = objects.get(&artifact.object_key).await?;

        Ok(ArtifactStream { artifact, reader })
    }
}

/// Trait for artifact operations
#[async_trait]
pub trait ArtifactService: Send + Sync {
    /// Upload the artifacts a run does not already record
    async fn add_artifacts(&self, run_id: &str, artifacts: Vec<Artifact>) -> ServiceResult<AddArtifactsResponse>;

    /// Resolve an artifact and open a stream over its bytes
    async fn get_artifact(&self, run_id: &str, name: &str) -> ServiceResult<ArtifactStream>;

    /// Pointers of every artifact of a run
    async fn list_artifacts(&self, run_id: &str) -> ServiceResult<Vec<SavedArtifact>>;
}

/// Default implementation of ArtifactService
pub struct DefaultArtifactService {
    store: SolidStore,
    coordinator: Arc<ArtifactCoordinator>,
}

impl DefaultArtifactService {
    pub fn new(store: SolidStore, coordinator: Arc<ArtifactCoordinator>) -> Self {
        Self { store, coordinator }
    }

    async fn ensure_run(&self, run_id: &str) -> ServiceResult<()> {
        if !self.store.run_exists(run_id).await? {
            return Err(ServiceError::NotFound(format!("run <{}>", run_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactService for DefaultArtifactService {
    #[instrument(skip(self, artifacts), fields(count = artifacts.len()))]
    async fn add_artifacts(&self, run_id: &str, artifacts: Vec<Artifact>) -> ServiceResult<AddArtifactsResponse> {
        let run_id = normalize_id(run_id);
        self.ensure_run(&run_id).await?;

        let mut by_name = artifacts_by_name(artifacts);
        let mut names: Vec<String> = by_name.keys().cloned().collect();
        names.sort();

        let exists = self.store.artifacts_exist(&run_id, &names).await?;

        let mut skipped = Vec::new();
        let mut missing = Vec::new();
        for name in names {
            if exists.get(&name).copied().unwrap_or(false) {
                skipped.push(name);
            } else if let Some(artifact) = by_name.remove(&name) {
                missing.push(artifact);
            }
        }

        if !skipped.is_empty() {
            debug!("Run <{}> already has artifact(s) {:?}", run_id, skipped);
        }

        let uploaded = self.coordinator.upload(&run_id, missing).await?;
        info!("Added {} artifact(s) to run <{}>", uploaded.len(), run_id);

        Ok(AddArtifactsResponse { uploaded, skipped })
    }

    #[instrument(skip(self))]
    async fn get_artifact(&self, run_id: &str, name: &str) -> ServiceResult<ArtifactStream> {
        let run_id = normalize_id(run_id);
        self.coordinator.open(&run_id, name).await
    }

    #[instrument(skip(self))]
    async fn list_artifacts(&self, run_id: &str) -> ServiceResult<Vec<SavedArtifact>> {
        let run_id = normalize_id(run_id);
        self.ensure_run(&run_id).await?;
        Ok(self.store.artifacts(&run_id).await?)
    }
}
