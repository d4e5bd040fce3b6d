//! Model registry service
//!
//! Every mutation goes through the store's optimistic registry update, so
//! concurrent writers to one registry never lose each other's entries.

use async_trait::async_trait;
use mlsolid_core::{distinct_tags, normalize_id, ModelEntry, ModelRegistry};
use mlsolid_db::SolidStore;
use tracing::{info, instrument};

use crate::error::{ServiceError, ServiceResult};

/// Trait for model registry operations
#[async_trait]
pub trait ModelRegistryService: Send + Sync {
    /// Create an empty registry; fails if the name is taken
    async fn create_registry(&self, name: &str) -> ServiceResult<ModelRegistry>;

    /// Load a registry with all entries and tags
    async fn get_registry(&self, name: &str) -> ServiceResult<ModelRegistry>;

    /// Append a model entry, returning its version
    async fn add_model_entry(&self, name: &str, url: &str, tags: Vec<String>) -> ServiceResult<usize>;

    /// Register a run artifact as a new entry, returning its version
    async fn add_artifact_to_registry(
        &self,
        name: &str,
        run_id: &str,
        artifact_name: &str,
        tags: Vec<String>,
    ) -> ServiceResult<usize>;

    /// Point each tag at `version`; all tags apply or none do
    async fn tag_model(&self, name: &str, version: usize, tags: Vec<String>) -> ServiceResult<()>;

    /// Entry the tag was last pointed at
    async fn get_tagged_model(&self, name: &str, tag: &str) -> ServiceResult<ModelEntry>;

    /// Every entry the tag was pointed at, in tagging order
    async fn get_tagged_models(&self, name: &str, tag: &str) -> ServiceResult<Vec<ModelEntry>>;

    /// Entry with the highest version
    async fn get_last_model_entry(&self, name: &str) -> ServiceResult<ModelEntry>;

    async fn get_model_by_version(&self, name: &str, version: usize) -> ServiceResult<ModelEntry>;
}

/// Default implementation of ModelRegistryService
pub struct DefaultModelRegistryService {
    store: SolidStore,
}

impl DefaultModelRegistryService {
    pub fn new(store: SolidStore) -> Self {
        Self { store }
    }

    async fn append(&self, name: &str, url: String, tags: Vec<String>) -> ServiceResult<usize> {
        if url.trim().is_empty() {
            return Err(ServiceError::BadRequest("model url cannot be empty".to_string()));
        }
        let tags = distinct_tags(&tags)?;

        let (_, version) = self
            .store
            .update_registry(name, move |registry| Ok(registry.add(url.clone(), &tags)))
            .await?;

        info!("Registered version {} in model registry <{}>", version, name);
        Ok(version)
    }
}

#[async_trait]
impl ModelRegistryService for DefaultModelRegistryService {
    #[instrument(skip(self))]
    async fn create_registry(&self, name: &str) -> ServiceResult<ModelRegistry> {
        let registry = ModelRegistry::new(name)?;
        self.store.create_registry(&registry).await?;

        info!("Created model registry <{}>", registry.name());
        Ok(registry)
    }

    #[instrument(skip(self))]
    async fn get_registry(&self, name: &str) -> ServiceResult<ModelRegistry> {
        Ok(self.store.registry(name).await?)
    }

    #[instrument(skip(self))]
    async fn add_model_entry(&self, name: &str, url: &str, tags: Vec<String>) -> ServiceResult<usize> {
        self.append(name, url.to_string(), tags).await
    }

    #[instrument(skip(self))]
    async fn add_artifact_to_registry(
        &self,
        name: &str,
        run_id: &str,
        artifact_name: &str,
        tags: Vec<String>,
    ) -> ServiceResult<usize> {
        let artifact = self.store.artifact(&normalize_id(run_id), artifact_name).await?;
        self.append(name, artifact.object_key, tags).await
    }

    #[instrument(skip(self))]
    async fn tag_model(&self, name: &str, version: usize, tags: Vec<String>) -> ServiceResult<()> {
        let tags = distinct_tags(&tags)?;
        if tags.is_empty() {
            return Err(ServiceError::BadRequest("no tags given".to_string()));
        }

        let count = tags.len();
        self.store
            .update_registry(name, move |registry| {
                for tag in &tags {
                    registry.add_tag(tag, version)?;
                }
                Ok(())
            })
            .await?;

        info!("Tagged version {} of model registry <{}> with {} tag(s)", version, name, count);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_tagged_model(&self, name: &str, tag: &str) -> ServiceResult<ModelEntry> {
        Ok(self.store.model_by_tag(name, tag).await?)
    }

    #[instrument(skip(self))]
    async fn get_tagged_models(&self, name: &str, tag: &str) -> ServiceResult<Vec<ModelEntry>> {
        Ok(self.store.models_by_tag(name, tag).await?)
    }

    #[instrument(skip(self))]
    async fn get_last_model_entry(&self, name: &str) -> ServiceResult<ModelEntry> {
        Ok(self.store.last_model(name).await?)
    }

    #[instrument(skip(self))]
    async fn get_model_by_version(&self, name: &str, version: usize) -> ServiceResult<ModelEntry> {
        Ok(self.store.model_by_version(name, version).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use mlsolid_core::{ContentType, Run, SavedArtifact};
    use mlsolid_db::MemoryKvStore;
    use std::sync::Arc;

    fn service() -> (DefaultModelRegistryService, SolidStore) {
        let store = SolidStore::new(Arc::new(MemoryKvStore::new()));
        (DefaultModelRegistryService::new(store.clone()), store)
    }

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_create_registry_twice() {
        let (service, _) = service();
        service.create_registry("linreg").await.unwrap();

        let err = service.create_registry("linreg").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInUse);
    }

    #[tokio::test]
    async fn test_prod_tag_follows_latest() {
        let (service, _) = service();
        service.create_registry("linreg").await.unwrap();

        service.add_model_entry("linreg", "s3://m/1", tags(&["prod"])).await.unwrap();
        service.add_model_entry("linreg", "s3://m/2", vec![]).await.unwrap();
        let version = service.add_model_entry("linreg", "s3://m/3", tags(&["prod"])).await.unwrap();
        assert_eq!(version, 3);

        assert_eq!(service.get_tagged_model("linreg", "prod").await.unwrap().url, "s3://m/3");
        assert_eq!(service.get_last_model_entry("linreg").await.unwrap().url, "s3://m/3");
        assert_eq!(service.get_model_by_version("linreg", 2).await.unwrap().url, "s3://m/2");

        let tagged = service.get_tagged_models("linreg", "prod").await.unwrap();
        let urls: Vec<&str> = tagged.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["s3://m/1", "s3://m/3"]);
    }

    #[tokio::test]
    async fn test_tag_model_is_all_or_nothing() {
        let (service, _) = service();
        service.create_registry("linreg").await.unwrap();
        service.add_model_entry("linreg", "s3://m/1", vec![]).await.unwrap();

        service.tag_model("linreg", 1, tags(&["staging", "best"])).await.unwrap();
        let entry = service.get_tagged_model("linreg", "best").await.unwrap();
        assert!(entry.has_tag("staging"));

        let err = service.tag_model("linreg", 2, tags(&["prod"])).await.unwrap_err();
        assert!(err.is_not_found());

        let registry = service.get_registry("linreg").await.unwrap();
        assert!(!registry.tags().contains_key("prod"));
        assert_eq!(registry.tags()["staging"], vec![1]);

        let err = service.tag_model("linreg", 1, vec![]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_repeated_and_blank_tags() {
        let (service, _) = service();
        service.create_registry("linreg").await.unwrap();
        service.add_model_entry("linreg", "s3://m/1", tags(&["prod"])).await.unwrap();
        service.add_model_entry("linreg", "s3://m/2", tags(&["dev", "dev"])).await.unwrap();

        service.tag_model("linreg", 2, tags(&["prod", "prod"])).await.unwrap();
        let registry = service.get_registry("linreg").await.unwrap();
        assert_eq!(registry.tags()["prod"], vec![1, 2]);
        assert_eq!(registry.tags()["dev"], vec![2]);
        assert_eq!(registry.model_by_version(2).unwrap().tags, vec!["dev", "v2", "prod"]);

        let err = service.tag_model("linreg", 1, tags(&["best", ""])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        let err = service.add_model_entry("linreg", "s3://m/3", tags(&[" "])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let registry = service.get_registry("linreg").await.unwrap();
        assert!(!registry.tags().contains_key("best"));
        assert_eq!(registry.latest_version(), 2);
    }

    #[tokio::test]
    async fn test_add_to_unknown_registry() {
        let (service, _) = service();
        let err = service.add_model_entry("ghost", "s3://m/1", vec![]).await.unwrap_err();
        assert!(err.is_not_found());

        let err = service.add_model_entry("ghost", " ", vec![]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_add_artifact_to_registry() {
        let (service, store) = service();
        store.create_run(&Run::new("run1", "exp1").unwrap()).await.unwrap();
        store
            .set_artifacts(
                "run1",
                &[SavedArtifact {
                    name: "linreg".to_string(),
                    content_type: ContentType::Model,
                    object_key: "mlsolid/linreg-0123456789ab".to_string(),
                }],
            )
            .await
            .unwrap();
        service.create_registry("linreg").await.unwrap();

        let version = service
            .add_artifact_to_registry("linreg", "Run1", "linreg", tags(&["candidate"]))
            .await
            .unwrap();
        assert_eq!(version, 1);

        let entry = service.get_model_by_version("linreg", 1).await.unwrap();
        assert_eq!(entry.url, "mlsolid/linreg-0123456789ab");
        assert!(entry.has_tag("candidate"));
        assert!(entry.has_tag("v1"));

        let err = service
            .add_artifact_to_registry("linreg", "run1", "missing", vec![])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
