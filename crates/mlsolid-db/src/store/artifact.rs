//! Artifact pointer persistence

use mlsolid_core::{ContentType, SavedArtifact};
use std::collections::HashMap;
use tracing::debug;

use super::SolidStore;
use crate::error::{DbError, DbResult};
use crate::keys;
use crate::kv::Pipeline;

impl SolidStore {
    /// Check whether a run already records an artifact under `name`
    pub async fn artifact_exists(&self, run_id: &str, name: &str) -> DbResult<bool> {
        self.kv.exists(&keys::artifact(name, run_id)).await
    }

    /// Existence of several artifact names in one batch
    pub async fn artifacts_exist(&self, run_id: &str, names: &[String]) -> DbResult<HashMap<String, bool>> {
        let mut p = Pipeline::new();
        for name in names {
            p.exists(keys::artifact(name, run_id));
        }

        let replies = self.kv.execute(p).await?;
        names
            .iter()
            .zip(replies)
            .map(|(name, reply)| Ok((name.clone(), reply.into_bool()?)))
            .collect()
    }

    /// Write artifact pointers for a run
    pub async fn set_artifacts(&self, run_id: &str, artifacts: &[SavedArtifact]) -> DbResult<()> {
        if artifacts.is_empty() {
            return Ok(());
        }

        let mut p = Pipeline::new();
        for artifact in artifacts {
            queue_artifact(&mut p, run_id, artifact);
        }

        debug!("Writing {} artifact pointer(s) for run <{}>", artifacts.len(), run_id);
        self.kv.execute(p).await?;
        Ok(())
    }

    /// Resolve one artifact pointer
    pub async fn artifact(&self, run_id: &str, name: &str) -> DbResult<SavedArtifact> {
        let hash = self.kv.hash_get_all(&keys::artifact(name, run_id)).await?;
        if hash.is_empty() {
            return Err(DbError::NotFound(format!(
                "artifact <{}> of run <{}>",
                name, run_id
            )));
        }

        parse_artifact(&hash)
    }

    /// Every artifact pointer recorded for a run, sorted by name
    pub async fn artifacts(&self, run_id: &str) -> DbResult<Vec<SavedArtifact>> {
        let found = self
            .run_keys(&keys::artifact_pattern(&keys::escape_pattern(run_id)), run_id)
            .await?;

        let mut p = Pipeline::new();
        for key in &found {
            p.hgetall(key.as_str());
        }

        let mut artifacts = Vec::with_capacity(found.len());
        for reply in self.kv.execute(p).await? {
            let hash = reply.into_hash()?;
            if !hash.is_empty() {
                artifacts.push(parse_artifact(&hash)?);
            }
        }
        artifacts.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(artifacts)
    }
}

pub(super) fn queue_artifact(p: &mut Pipeline, run_id: &str, artifact: &SavedArtifact) {
    p.hset(
        keys::artifact(&artifact.name, run_id),
        [
            (keys::ARTIFACT_NAME, artifact.name.clone()),
            (keys::ARTIFACT_CONTENT_TYPE, artifact.content_type.to_string()),
            (keys::ARTIFACT_OBJECT_KEY, artifact.object_key.clone()),
        ],
    );
}

pub(super) fn parse_artifact(hash: &HashMap<String, String>) -> DbResult<SavedArtifact> {
    let field = |name: &str| {
        hash.get(name)
            .cloned()
            .ok_or_else(|| DbError::InvalidData(format!("artifact hash is missing {}", name)))
    };

    let content_type = field(keys::ARTIFACT_CONTENT_TYPE)?
        .parse::<ContentType>()
        .map_err(|e| DbError::InvalidData(e.to_string()))?;

    Ok(SavedArtifact {
        name: field(keys::ARTIFACT_NAME)?,
        content_type,
        object_key: field(keys::ARTIFACT_OBJECT_KEY)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKvStore;
    use std::sync::Arc;

    fn pointer(name: &str) -> SavedArtifact {
        SavedArtifact {
            name: name.to_string(),
            content_type: ContentType::Text,
            object_key: format!("mlsolid/{}-000000000000", name),
        }
    }

    #[tokio::test]
    async fn test_pointer_roundtrip() {
        let store = SolidStore::new(Arc::new(MemoryKvStore::new()));
        store
            .set_artifacts("run1", &[pointer("a.log"), pointer("b.log")])
            .await
            .unwrap();

        assert!(store.artifact_exists("run1", "a.log").await.unwrap());
        assert_eq!(store.artifact("run1", "b.log").await.unwrap(), pointer("b.log"));

        let all = store.artifacts("run1").await.unwrap();
        assert_eq!(all, vec![pointer("a.log"), pointer("b.log")]);
        assert!(store.artifacts("run2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_existence() {
        let store = SolidStore::new(Arc::new(MemoryKvStore::new()));
        store.set_artifacts("run1", &[pointer("a.log")]).await.unwrap();

        let names = vec!["a.log".to_string(), "b.log".to_string()];
        let exists = store.artifacts_exist("run1", &names).await.unwrap();
        assert!(exists["a.log"]);
        assert!(!exists["b.log"]);
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let store = SolidStore::new(Arc::new(MemoryKvStore::new()));
        assert!(store.artifact("run1", "nope").await.unwrap_err().is_not_found());
    }

    #[test]
    fn test_malformed_pointer() {
        let mut hash = HashMap::new();
        hash.insert(keys::ARTIFACT_NAME.to_string(), "x".to_string());
        hash.insert(keys::ARTIFACT_CONTENT_TYPE.to_string(), "image/png".to_string());
        hash.insert(keys::ARTIFACT_OBJECT_KEY.to_string(), "k".to_string());

        assert!(matches!(parse_artifact(&hash), Err(DbError::InvalidData(_))));
    }
}
