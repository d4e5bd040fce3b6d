//! Model registry persistence
//!
//! Entries are stored newest first, so version `v` of a registry sits at
//! list index `-v` and stays addressable while new versions are pushed.
//! Create and update go through the optimistic transaction on the
//! registry's info, entries and tag index keys.

use chrono::{TimeZone, Utc};
use mlsolid_core::{ModelEntry, ModelRegistry, TagIndex};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::SolidStore;
use crate::error::{DbError, DbResult};
use crate::keys;
use crate::kv::{KvStore, Pipeline, TxFuture};

impl SolidStore {
    /// Check whether a registry exists
    pub async fn registry_exists(&self, name: &str) -> DbResult<bool> {
        self.kv.exists(&keys::registry_info(name)).await
    }

    /// Persist a new registry. Fails with [`DbError::AlreadyExists`] when the
    /// name is taken.
    pub async fn create_registry(&self, registry: &ModelRegistry) -> DbResult<()> {
        let name = registry.name().to_string();
        let watch = keys::registry_watch(&name);

        let kv = self.kv.clone();
        let owned = registry.clone();
        let body = move || -> TxFuture {
            let kv = kv.clone();
            let registry = owned.clone();
            Box::pin(async move {
                if kv.exists(&keys::registry_info(registry.name())).await? {
                    return Err(DbError::AlreadyExists(format!(
                        "model registry <{}>",
                        registry.name()
                    )));
                }

                let mut p = Pipeline::new();
                queue_registry(&mut p, &registry, true)?;
                Ok(p)
            })
        };

        self.kv.transaction(&watch, self.max_retries, &body).await?;

        info!("Created model registry <{}>", name);
        Ok(())
    }

    /// Load a registry with its entries and tag index
    pub async fn registry(&self, name: &str) -> DbResult<ModelRegistry> {
        load_registry(self.kv.as_ref(), name).await
    }

    /// Read-modify-write a registry under the optimistic transaction.
    ///
    /// `mutate` runs against freshly loaded state on every attempt; its
    /// result and the registry it produced on the committed attempt are
    /// returned. The entry list and tag index are rewritten in full.
    pub async fn update_registry<T, F>(&self, name: &str, mutate: F) -> DbResult<(ModelRegistry, T)>
    where
        T: Send + 'static,
        F: Fn(&mut ModelRegistry) -> mlsolid_core::Result<T> + Send + Sync + 'static,
    {
        let watch = keys::registry_watch(name);
        let committed: Arc<Mutex<Option<(ModelRegistry, T)>>> = Arc::new(Mutex::new(None));

        let kv = self.kv.clone();
        let mutate = Arc::new(mutate);
        let slot = committed.clone();
        let name_owned = name.to_string();
        let body = move || -> TxFuture {
            let kv = kv.clone();
            let mutate = mutate.clone();
            let slot = slot.clone();
            let name = name_owned.clone();
            Box::pin(async move {
                let mut registry = load_registry(kv.as_ref(), &name).await?;
                let outcome = mutate(&mut registry)?;

                let mut p = Pipeline::new();
                queue_registry(&mut p, &registry, false)?;

                *slot.lock().await = Some((registry, outcome));
                Ok::<_, DbError>(p)
            })
        };

        self.kv.transaction(&watch, self.max_retries, &body).await?;

        let result = committed.lock().await.take();
        let (registry, outcome) = result.ok_or_else(|| {
            DbError::Protocol(format!("update of registry <{}> produced no state", name))
        })?;

        debug!(
            "Updated model registry <{}>, latest version {}",
            name,
            registry.latest_version()
        );
        Ok((registry, outcome))
    }

    /// Replace the entries and tag index of an existing registry
    pub async fn replace_registry(&self, registry: &ModelRegistry) -> DbResult<()> {
        let replacement = registry.clone();
        self.update_registry(registry.name(), move |current| {
            *current = replacement.clone();
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Highest version of a registry
    pub async fn last_model(&self, name: &str) -> DbResult<ModelEntry> {
        self.ensure_registry(name).await?;

        let entries = self.kv.list_range(&keys::registry_entries(name), 0, 0).await?;
        let raw = entries.first().ok_or_else(|| {
            DbError::NotFound(format!("model registry <{}> has no entries", name))
        })?;

        Ok(serde_json::from_str(raw)?)
    }

    /// Entry at `version` (1-based)
    pub async fn model_by_version(&self, name: &str, version: usize) -> DbResult<ModelEntry> {
        self.ensure_registry(name).await?;
        entry_at(self.kv.as_ref(), name, version).await
    }

    /// Entry most recently tagged with `tag`
    pub async fn model_by_tag(&self, name: &str, tag: &str) -> DbResult<ModelEntry> {
        self.ensure_registry(name).await?;

        let latest = self
            .kv
            .list_range(&keys::registry_tag(name, tag), 0, 0)
            .await?;
        let raw = latest.first().ok_or_else(|| {
            DbError::NotFound(format!("tag <{}> in model registry <{}>", tag, name))
        })?;

        entry_at(self.kv.as_ref(), name, parse_version(raw)?).await
    }

    /// Every entry tagged with `tag`, in tag append order
    pub async fn models_by_tag(&self, name: &str, tag: &str) -> DbResult<Vec<ModelEntry>> {
        let registry = self.registry(name).await?;
        let entries = registry.models_by_tag(tag)?;
        Ok(entries.into_iter().cloned().collect())
    }

    async fn ensure_registry(&self, name: &str) -> DbResult<()> {
        if self.registry_exists(name).await? {
            Ok(())
        } else {
            Err(DbError::NotFound(format!("model registry <{}>", name)))
        }
    }
}

async fn entry_at(kv: &dyn KvStore, name: &str, version: usize) -> DbResult<ModelEntry> {
    let missing = || DbError::NotFound(format!("version {} of model registry <{}>", version, name));
    if version == 0 {
        return Err(missing());
    }

    let index = -(version as isize);
    let entries = kv.list_range(&keys::registry_entries(name), index, index).await?;
    let raw = entries.first().ok_or_else(missing)?;

    Ok(serde_json::from_str(raw)?)
}

async fn load_registry(kv: &dyn KvStore, name: &str) -> DbResult<ModelRegistry> {
    let mut p = Pipeline::new();
    p.hgetall(keys::registry_info(name))
        .lrange(keys::registry_entries(name), 0, -1)
        .smembers(keys::registry_tags(name));

    let mut replies = kv.execute(p).await?.into_iter();
    let mut next = || {
        replies
            .next()
            .ok_or_else(|| DbError::Protocol("short pipeline reply".to_string()))
    };

    let info = next()?.into_hash()?;
    let raw_entries = next()?.into_list()?;
    let mut tags = next()?.into_list()?;
    tags.sort();

    if info.is_empty() {
        return Err(DbError::NotFound(format!("model registry <{}>", name)));
    }

    let created_at = info
        .get(keys::REGISTRY_CREATED_AT)
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| {
            DbError::InvalidData(format!("model registry <{}> has a malformed CreatedAt", name))
        })?;

    // Stored newest first
    let models = raw_entries
        .iter()
        .rev()
        .map(|raw| serde_json::from_str::<ModelEntry>(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let mut p = Pipeline::new();
    for tag in &tags {
        p.lrange(keys::registry_tag(name, tag), 0, -1);
    }

    let mut index = TagIndex::new();
    for (tag, reply) in tags.iter().zip(kv.execute(p).await?) {
        let versions = reply
            .into_list()?
            .iter()
            .rev()
            .map(|raw| parse_version(raw))
            .collect::<DbResult<Vec<_>>>()?;
        index.insert(tag.clone(), versions);
    }

    let registry_name = info
        .get(keys::REGISTRY_NAME)
        .cloned()
        .unwrap_or_else(|| name.to_string());

    Ok(ModelRegistry::from_parts(registry_name, created_at, models, index)?)
}

/// Queue the full state of a registry: entries and tag index are deleted and
/// rewritten. Tag keys of tags absent from the index are left untouched.
fn queue_registry(p: &mut Pipeline, registry: &ModelRegistry, with_info: bool) -> DbResult<()> {
    let name = registry.name();
    let entries_key = keys::registry_entries(name);
    let tags_key = keys::registry_tags(name);

    if with_info {
        p.hset(
            keys::registry_info(name),
            [
                (keys::REGISTRY_NAME, name.to_string()),
                (
                    keys::REGISTRY_CREATED_AT,
                    registry.created_at().timestamp_millis().to_string(),
                ),
            ],
        );
    }

    p.del([entries_key.clone(), tags_key.clone()]);

    for entry in registry.models() {
        p.lpush(entries_key.as_str(), serde_json::to_string(entry)?);
    }

    for (tag, versions) in registry.tags() {
        let tag_key = keys::registry_tag(name, tag);
        p.sadd(tags_key.as_str(), tag.as_str());
        p.del([tag_key.clone()]);
        for version in versions {
            p.lpush(tag_key.as_str(), version.to_string());
        }
    }

    Ok(())
}

fn parse_version(raw: &str) -> DbResult<usize> {
    raw.parse::<usize>()
        .map_err(|_| DbError::InvalidData(format!("malformed model version: {}", raw)))
}
