//! Artifact types
//!
//! An artifact is a named payload produced by a run. Its bytes live in the
//! object store while a [`SavedArtifact`] pointer lives in the metadata store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SolidError};

/// Kind of content an artifact carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    /// Plain text file (logs, configs)
    #[serde(rename = "content-type/text")]
    Text,
    /// Model checkpoint
    #[serde(rename = "content-type/model")]
    Model,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "content-type/text",
            ContentType::Model => "content-type/model",
        }
    }

    /// Check whether a raw content type string is known
    pub fn is_valid(raw: &str) -> bool {
        raw.parse::<ContentType>().is_ok()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = SolidError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "content-type/text" => Ok(ContentType::Text),
            "content-type/model" => Ok(ContentType::Model),
            _ => Err(SolidError::BadRequest(format!(
                "unknown content type for artifact: {}",
                s
            ))),
        }
    }
}

/// Artifact content waiting to be uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    name: String,
    content_type: ContentType,
    content: Vec<u8>,
}

impl Artifact {
    /// Build an artifact from a raw content type string
    pub fn new(name: impl Into<String>, content_type: &str, content: Vec<u8>) -> Result<Self> {
        let content_type = content_type.parse::<ContentType>()?;
        Self::typed(name, content_type, content)
    }

    /// Build an artifact with an already validated content type
    pub fn typed(name: impl Into<String>, content_type: ContentType, content: Vec<u8>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SolidError::BadRequest(
                "artifact name cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            name,
            content_type,
            content,
        })
    }

    /// Plain text artifact
    pub fn text(file_name: impl Into<String>, content: impl Into<String>) -> Result<Self> {
        Self::typed(file_name, ContentType::Text, content.into().into_bytes())
    }

    /// Model checkpoint artifact
    pub fn checkpoint(model: impl Into<String>, checkpoint: Vec<u8>) -> Result<Self> {
        Self::typed(model, ContentType::Model, checkpoint)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Pointer to an uploaded artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedArtifact {
    /// Logical artifact name within its run
    pub name: String,
    /// Content type of the blob
    pub content_type: ContentType,
    /// Object store key holding the bytes
    pub object_key: String,
}

impl SavedArtifact {
    pub fn new(artifact: &Artifact, object_key: impl Into<String>) -> Self {
        Self {
            name: artifact.name().to_string(),
            content_type: artifact.content_type(),
            object_key: object_key.into(),
        }
    }
}

/// Names of the given artifacts, in order
pub fn artifact_names(artifacts: &[Artifact]) -> Vec<String> {
    artifacts.iter().map(|a| a.name().to_string()).collect()
}

/// Index artifacts by name; later duplicates win
pub fn artifacts_by_name(artifacts: Vec<Artifact>) -> HashMap<String, Artifact> {
    artifacts
        .into_iter()
        .map(|a| (a.name().to_string(), a))
        .collect()
}
