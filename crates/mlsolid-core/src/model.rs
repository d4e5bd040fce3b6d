//! Model registry engine
//!
//! A [`ModelRegistry`] is an ordered list of [`ModelEntry`] values whose
//! 1-based position is the entry's version, plus a tag index mapping each tag
//! to the versions it was attached to in append order. The most recently
//! appended version of a tag is what tag lookups resolve to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SolidError};
use crate::types::{TagIndex, Tags};

/// One registered model checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Location of the checkpoint (usually an object store key)
    #[serde(rename = "URL")]
    pub url: String,
    /// Tags carried by the entry, including its version label
    #[serde(rename = "Tags", default)]
    pub tags: Tags,
}

impl ModelEntry {
    pub fn new(url: impl Into<String>, tags: Tags) -> Self {
        Self {
            url: url.into(),
            tags,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Versioned, tagged list of model entries
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRegistry {
    name: String,
    created_at: DateTime<Utc>,
    models: Vec<ModelEntry>,
    tags: TagIndex,
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::from_parts(name, Utc::now(), Vec::new(), TagIndex::new())
    }

    /// Rebuild a registry from stored state.
    ///
    /// `models` must be in version order and every version in `tags` must
    /// point at an existing entry.
    pub fn from_parts(
        name: impl Into<String>,
        created_at: DateTime<Utc>,
        models: Vec<ModelEntry>,
        tags: TagIndex,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SolidError::BadRequest(
                "model registry name cannot be empty".to_string(),
            ));
        }

        let len = models.len();
        for (tag, versions) in &tags {
            if let Some(v) = versions.iter().find(|v| **v < 1 || **v > len) {
                return Err(SolidError::InvalidInput(format!(
                    "tag <{}> of registry <{}> points at unknown version {}",
                    tag, name, v
                )));
            }
        }

        Ok(Self {
            name,
            created_at,
            models,
            tags,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Entries in version order (index 0 is version 1)
    pub fn models(&self) -> &[ModelEntry] {
        &self.models
    }

    pub fn tags(&self) -> &TagIndex {
        &self.tags
    }

    /// Label automatically attached to an entry at the given version
    pub fn version_tag(version: usize) -> String {
        format!("v{}", version)
    }

    /// Highest version, 0 when the registry is empty
    pub fn latest_version(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Register a new checkpoint at the next version.
    ///
    /// The entry carries the caller's tags plus its version label; the
    /// caller's tags are indexed to the new version. Returns the version.
    pub fn add(&mut self, url: impl Into<String>, tags: &[String]) -> usize {
        let version = self.models.len() + 1;

        let mut entry_tags: Tags = Vec::with_capacity(tags.len() + 1);
        for tag in tags {
            if !entry_tags.contains(tag) {
                self.index_tag(tag, version);
                entry_tags.push(tag.clone());
            }
        }
        entry_tags.push(Self::version_tag(version));
        self.models.push(ModelEntry::new(url, entry_tags));

        version
    }

    /// Attach a tag to an existing version
    pub fn add_tag(&mut self, tag: &str, version: usize) -> Result<()> {
        if tag.trim().is_empty() {
            return Err(SolidError::BadRequest("tag cannot be empty".to_string()));
        }
        if version < 1 || version > self.models.len() {
            return Err(SolidError::NotFound(format!(
                "version {} of registry <{}>",
                version, self.name
            )));
        }

        self.index_tag(tag, version);

        let entry = &mut self.models[version - 1];
        if !entry.has_tag(tag) {
            entry.tags.push(tag.to_string());
        }
        Ok(())
    }

    fn index_tag(&mut self, tag: &str, version: usize) {
        self.tags.entry(tag.to_string()).or_default().push(version);
    }

    pub fn model_by_version(&self, version: usize) -> Result<&ModelEntry> {
        if version < 1 || version > self.models.len() {
            return Err(SolidError::NotFound(format!(
                "version {} of registry <{}>",
                version, self.name
            )));
        }
        Ok(&self.models[version - 1])
    }

    /// Entry most recently tagged with `tag`
    pub fn model_by_tag(&self, tag: &str) -> Result<&ModelEntry> {
        let version = self
            .tags
            .get(tag)
            .and_then(|versions| versions.last())
            .ok_or_else(|| self.unknown_tag(tag))?;
        self.model_by_version(*version)
    }

    /// Every entry tagged with `tag`, in tag append order
    pub fn models_by_tag(&self, tag: &str) -> Result<Vec<&ModelEntry>> {
        let versions = self.tags.get(tag).ok_or_else(|| self.unknown_tag(tag))?;
        versions.iter().map(|v| self.model_by_version(*v)).collect()
    }

    pub fn last_model(&self) -> Result<&ModelEntry> {
        self.models.last().ok_or_else(|| {
            SolidError::NotFound(format!("registry <{}> has no entries", self.name))
        })
    }

    fn unknown_tag(&self, tag: &str) -> SolidError {
        SolidError::NotFound(format!("tag <{}> in registry <{}>", tag, self.name))
    }
}
