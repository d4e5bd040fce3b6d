//! Service layer for mlsolid
//!
//! This crate sits between a transport (RPC server, CLI) and the storage
//! layer. It composes the metadata store, object store, metric accumulator
//! and model registry engine into the operations callers use.
//!
//! # Architecture
//!
//! - **RunService**: run creation, metric logging, run and experiment queries
//! - **ArtifactService**: deduplicated artifact uploads and artifact reads
//! - **ModelRegistryService**: versioned, tagged model registries
//!
//! # Example
//!
//! ```rust,no_run
//! use mlsolid_db::{MemoryKvStore, MemoryObjectStore, SolidStore};
//! use mlsolid_service::{CreateRunRequest, ServiceRegistry};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SolidStore::new(Arc::new(MemoryKvStore::new()));
//! let services = ServiceRegistry::new(store, Some(Arc::new(MemoryObjectStore::new("mlsolid"))));
//!
//! let run = services
//!     .runs()
//!     .create_run(CreateRunRequest::new("run1", "exp1"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod dto;
pub mod error;
pub mod registry;
pub mod run;

// Re-export main types for convenience
pub use dto::*;
pub use error::{ErrorKind, ServiceError, ServiceResult};

// Re-export service traits and implementations
pub use artifact::{ArtifactCoordinator, ArtifactService, ArtifactStream, DefaultArtifactService};
pub use registry::{DefaultModelRegistryService, ModelRegistryService};
pub use run::{DefaultRunService, RunService};

use mlsolid_db::{ObjectStore, SolidStore};
use std::sync::Arc;

/// Service registry that holds all service instances
#[derive(Clone)]
pub struct ServiceRegistry {
    /// Run service
    pub runs: Arc<dyn RunService>,
    /// Artifact service
    pub artifacts: Arc<dyn ArtifactService>,
    /// Model registry service
    pub registries: Arc<dyn ModelRegistryService>,
}

impl ServiceRegistry {
    /// Create a service registry with default implementations.
    ///
    /// `objects` may be `None`; artifact operations then fail with
    /// [`ErrorKind::NotInitialized`] while everything else keeps working.
    pub fn new(store: SolidStore, objects: Option<Arc<dyn ObjectStore>>) -> Self {
        let coordinator = Arc::new(ArtifactCoordinator::new(store.clone(), objects));

        Self {
            runs: Arc::new(DefaultRunService::new(store.clone(), coordinator.clone())),
            artifacts: Arc::new(DefaultArtifactService::new(store.clone(), coordinator)),
            registries: Arc::new(DefaultModelRegistryService::new(store)),
        }
    }

    /// Create a service registry with custom implementations
    pub fn with_services(
        runs: Arc<dyn RunService>,
        artifacts: Arc<dyn ArtifactService>,
        registries: Arc<dyn ModelRegistryService>,
    ) -> Self {
        Self {
            runs,
            artifacts,
            registries,
        }
    }

    pub fn runs(&self) -> &Arc<dyn RunService> {
        &self.runs
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactService> {
        &self.artifacts
    }

    pub fn registries(&self) -> &Arc<dyn ModelRegistryService> {
        &self.registries
    }
}

/// Builder for ServiceRegistry with custom configuration
#[derive(Default)]
pub struct ServiceRegistryBuilder {
    store: Option<SolidStore>,
    objects: Option<Arc<dyn ObjectStore>>,
    runs: Option<Arc<dyn RunService>>,
    artifacts: Option<Arc<dyn ArtifactService>>,
    registries: Option<Arc<dyn ModelRegistryService>>,
}

impl ServiceRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the metadata store
    pub fn store(mut self, store: SolidStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the object store
    pub fn object_store(mut self, objects: Arc<dyn ObjectStore>) -> Self {
        self.objects = Some(objects);
        self
    }

    /// Set a custom run service
    pub fn run_service(mut self, service: Arc<dyn RunService>) -> Self {
        self.runs = Some(service);
        self
    }

    /// Set a custom artifact service
    pub fn artifact_service(mut self, service: Arc<dyn ArtifactService>) -> Self {
        self.artifacts = Some(service);
        self
    }

    /// Set a custom model registry service
    pub fn registry_service(mut self, service: Arc<dyn ModelRegistryService>) -> Self {
        self.registries = Some(service);
        self
    }

    /// Build the service registry.
    ///
    /// Services not set explicitly get default implementations.
    ///
    /// # Errors
    ///
    /// Returns an error if no store is set.
    pub fn build(self) -> Result<ServiceRegistry, String> {
        let store = self.store.ok_or("Store is required")?;
        let coordinator = Arc::new(ArtifactCoordinator::new(store.clone(), self.objects));

        let runs = self
            .runs
            .unwrap_or_else(|| Arc::new(DefaultRunService::new(store.clone(), coordinator.clone())));

        let artifacts = self
            .artifacts
            .unwrap_or_else(|| Arc::new(DefaultArtifactService::new(store.clone(), coordinator)));

        let registries = self
            .registries
            .unwrap_or_else(|| Arc::new(DefaultModelRegistryService::new(store)));

        Ok(ServiceRegistry {
            runs,
            artifacts,
            registries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlsolid_db::MemoryKvStore;

    #[test]
    fn test_builder_requires_store() {
        let err = ServiceRegistryBuilder::new().build().err();
        assert_eq!(err.as_deref(), Some("Store is required"));
    }

    #[tokio::test]
    async fn test_builder_wires_defaults() {
        let store = SolidStore::new(Arc::new(MemoryKvStore::new()));
        let services = ServiceRegistryBuilder::new().store(store).build().unwrap();

        services
            .registries()
            .create_registry("linreg")
            .await
            .unwrap();
        assert!(services.runs().list_experiments().await.unwrap().is_empty());
    }
}
