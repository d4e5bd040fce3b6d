//! Store configuration
//!
//! Builders for the Redis metadata store and the object store, validated
//! before any connection is attempted.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DbError, DbResult};
use crate::kv::DEFAULT_TRANSACTION_MAX_RETRIES;

/// Default Redis URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default connection timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default object key prefix
pub const DEFAULT_OBJECT_PREFIX: &str = "mlsolid";

/// Configuration for the Redis metadata store
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://:pass@localhost:6379/0)
    pub url: String,

    /// Attempts granted to an optimistic transaction before giving up
    pub max_retries: usize,

    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
}

impl RedisConfig {
    /// Create a new configuration with sensible defaults
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_retries: DEFAULT_TRANSACTION_MAX_RETRIES,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Set the transaction retry budget
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> DbResult<()> {
        if self.url.is_empty() {
            return Err(DbError::Configuration(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        let parsed = url::Url::parse(&self.url)?;
        if !matches!(parsed.scheme(), "redis" | "rediss" | "redis+unix" | "unix") {
            return Err(DbError::Configuration(format!(
                "unsupported Redis URL scheme: {}",
                parsed.scheme()
            )));
        }

        if self.max_retries == 0 {
            return Err(DbError::Configuration(
                "max_retries must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REDIS_URL)
    }
}

/// Configuration for the filesystem object store
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// Directory acting as the bucket
    pub root: PathBuf,

    /// Prefix prepended to every generated object key
    pub prefix: String,
}

impl ObjectStoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            prefix: DEFAULT_OBJECT_PREFIX.to_string(),
        }
    }

    /// Set the key prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(DbError::Configuration(
                "object store root cannot be empty".to_string(),
            ));
        }

        if self.prefix.contains("..") || self.prefix.starts_with('/') {
            return Err(DbError::Configuration(format!(
                "object prefix must be a relative path: {}",
                self.prefix
            )));
        }

        Ok(())
    }
}
