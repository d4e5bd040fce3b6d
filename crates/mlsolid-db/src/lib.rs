//! Storage layer for mlsolid
//!
//! This crate provides persistence for the experiment tracker, including:
//! - The metadata store capability ([`KvStore`]) with Redis and in-memory backends
//! - A bounded-retry optimistic transaction for read-modify-write updates
//! - The stable key-space shared with other readers of the metadata store
//! - The typed repository ([`SolidStore`]) for runs, metrics, artifacts and registries
//! - The object store capability with filesystem and in-memory backends
//!
//! # Example
//!
//! ```rust,no_run
//! use mlsolid_db::{RedisConfig, RedisKvStore, SolidStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RedisConfig::new("redis://localhost:6379").max_retries(10);
//! let kv = RedisKvStore::new(config).await?;
//!
//! let store = SolidStore::new(Arc::new(kv));
//! let experiments = store.experiment_ids().await?;
//! # Ok(())
//! # }
//! ```

// Re-export core domain types for convenience
pub use mlsolid_core;

// Public modules
pub mod config;
pub mod error;
pub mod keys;
pub mod kv;
pub mod memory;
pub mod object_store;
pub mod redis_store;
pub mod store;

// Re-exports for convenience
pub use config::{ObjectStoreConfig, RedisConfig};
pub use error::{DbError, DbResult};
pub use kv::{Command, KvStore, LogEntry, Pipeline, Reply, TxFn, TxFuture, DEFAULT_TRANSACTION_MAX_RETRIES};
pub use memory::MemoryKvStore;
pub use object_store::{
    generate_object_key, FileSystemObjectStore, MemoryObjectStore, ObjectReader, ObjectStore,
};
pub use redis_store::{mask_redis_url, RedisKvStore};
pub use store::SolidStore;

/// Storage layer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default Redis URL environment variable name
pub const DEFAULT_REDIS_URL_ENV: &str = "REDIS_URL";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_env_var() {
        assert_eq!(DEFAULT_REDIS_URL_ENV, "REDIS_URL");
    }
}
