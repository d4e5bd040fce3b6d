//! Object store capability
//!
//! Blob storage addressed by key, scoped to a single bucket and key prefix.
//! Keys are generated by the store so that re-uploading an artifact under the
//! same logical name never overwrites an earlier blob.

use async_trait::async_trait;
use rand::RngCore;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::ObjectStoreConfig;
use crate::error::{DbError, DbResult};

/// Readable stream over a stored object
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Number of random bytes in a generated key suffix
pub const KEY_SUFFIX_BYTES: usize = 6;

/// Build a fresh object key: `<prefix>/<name>-<12 hex chars>`
pub fn generate_object_key(prefix: &str, name: &str) -> String {
    let mut suffix = [0u8; KEY_SUFFIX_BYTES];
    rand::thread_rng().fill_bytes(&mut suffix);

    let hex: String = suffix.iter().map(|b| format!("{:02x}", b)).collect();
    let prefix = prefix.trim_end_matches('/');

    if prefix.is_empty() {
        format!("{}-{}", name, hex)
    } else {
        format!("{}/{}-{}", prefix, name, hex)
    }
}

/// Blob store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Generate a never-reused key for an object named `name`
    fn generate_key(&self, name: &str) -> String;

    /// Store `data` under `key`, returning the key
    async fn put(&self, key: &str, data: Vec<u8>) -> DbResult<String>;

    /// Open a readable stream over the object at `key`
    async fn get(&self, key: &str) -> DbResult<ObjectReader>;

    /// Check whether an object exists
    async fn exists(&self, key: &str) -> DbResult<bool>;
}

/// Filesystem-backed object store; the root directory acts as the bucket
#[derive(Debug, Clone)]
pub struct FileSystemObjectStore {
    root: PathBuf,
    prefix: String,
}

impl FileSystemObjectStore {
    /// Open the store, creating the root directory if needed
    pub async fn new(config: ObjectStoreConfig) -> DbResult<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.root).await.map_err(|e| {
            DbError::Configuration(format!(
                "cannot create object store root {}: {}",
                config.root.display(),
                e
            ))
        })?;

        info!("Object store rooted at {}", config.root.display());

        Ok(Self {
            root: config.root,
            prefix: config.prefix,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> DbResult<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        if key.is_empty() || !safe {
            return Err(DbError::ObjectStore(format!("invalid object key: {}", key)));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FileSystemObjectStore {
    fn generate_key(&self, name: &str) -> String {
        generate_object_key(&self.prefix, name)
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> DbResult<String> {
        let path = self.path_for(key)?;
        debug!("Object PUT: {} ({} bytes)", key, data.len());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> DbResult<ObjectReader> {
        let path = self.path_for(key)?;
        debug!("Object GET: {}", key);

        let file = tokio::fs::File::open(&path).await?;
        Ok(Box::new(file))
    }

    async fn exists(&self, key: &str) -> DbResult<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

/// In-memory object store
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    prefix: String,
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            objects: Arc::default(),
        }
    }

    /// Number of stored objects
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Keys of all stored objects, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn generate_key(&self, name: &str) -> String {
        generate_object_key(&self.prefix, name)
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> DbResult<String> {
        debug!("Object PUT: {} ({} bytes)", key, data.len());
        self.objects.write().await.insert(key.to_string(), data);
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> DbResult<ObjectReader> {
        let objects = self.objects.read().await;
        let data = objects
            .get(key)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("object {}", key)))?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn exists(&self, key: &str) -> DbResult<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn read_all(mut reader: ObjectReader) -> Vec<u8> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[test]
    fn test_generated_key_format() {
        let key = generate_object_key("mlsolid", "model.pt");
        let (head, suffix) = key.rsplit_once('-').unwrap();
        assert_eq!(head, "mlsolid/model.pt");
        assert_eq!(suffix.len(), KEY_SUFFIX_BYTES * 2);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        assert!(generate_object_key("", "a").starts_with("a-"));
    }

    #[test]
    fn test_generated_keys_are_fresh() {
        let a = generate_object_key("p", "model.pt");
        let b = generate_object_key("p", "model.pt");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryObjectStore::new("mlsolid");
        let key = store.generate_key("train.log");

        store.put(&key, b"epoch 1".to_vec()).await.unwrap();
        assert!(store.exists(&key).await.unwrap());
        assert_eq!(read_all(store.get(&key).await.unwrap()).await, b"epoch 1");

        let err = store.get("missing").await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_filesystem_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemObjectStore::new(ObjectStoreConfig::new(dir.path()).prefix("runs"))
            .await
            .unwrap();

        let key = store.generate_key("model.pt");
        assert!(key.starts_with("runs/model.pt-"));

        store.put(&key, vec![1, 2, 3]).await.unwrap();
        assert!(store.exists(&key).await.unwrap());
        assert_eq!(read_all(store.get(&key).await.unwrap()).await, vec![1, 2, 3]);

        assert!(!store.exists("runs/other").await.unwrap());
        assert!(store.get("runs/other").await.err().unwrap().is_not_found());
    }

    #[tokio::test]
    async fn test_filesystem_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemObjectStore::new(ObjectStoreConfig::new(dir.path()))
            .await
            .unwrap();

        assert!(store.put("../outside", vec![1]).await.is_err());
        assert!(store.put("/abs", vec![1]).await.is_err());
    }
}
