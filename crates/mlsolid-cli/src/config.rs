//! CLI configuration
//!
//! Configuration is layered from multiple sources:
//! - Default configuration file
//! - Environment-specific configuration file
//! - Environment variables
//! - Command-line arguments (applied by the caller)

use config::{Config, ConfigError, Environment, File};
use mlsolid_db::config::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_OBJECT_PREFIX, DEFAULT_REDIS_URL};
use mlsolid_db::DEFAULT_TRANSACTION_MAX_RETRIES;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Metadata store settings
    #[serde(default)]
    pub redis: RedisSection,

    /// Object store settings
    #[serde(default)]
    pub object_store: ObjectStoreSection,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSection {
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Attempts granted to an optimistic transaction
    #[serde(default = "default_max_retries")]
    pub transaction_max_retries: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_redis_url() -> String {
    DEFAULT_REDIS_URL.to_string()
}

fn default_max_retries() -> usize {
    DEFAULT_TRANSACTION_MAX_RETRIES
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            transaction_max_retries: default_max_retries(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

/// Object store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreSection {
    /// Bucket directory; artifact operations are disabled without one
    #[serde(default)]
    pub root: Option<PathBuf>,

    #[serde(default = "default_object_prefix")]
    pub prefix: String,
}

fn default_object_prefix() -> String {
    DEFAULT_OBJECT_PREFIX.to_string()
}

impl Default for ObjectStoreSection {
    fn default() -> Self {
        Self {
            root: None,
            prefix: default_object_prefix(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON formatting
    #[serde(default)]
    pub json_format: bool,

    /// Include thread IDs
    #[serde(default)]
    pub include_thread_ids: bool,

    /// Include target module
    #[serde(default = "default_true")]
    pub include_target: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            include_thread_ids: false,
            include_target: true,
        }
    }
}

impl CliConfig {
    /// Load configuration from files and environment
    ///
    /// Later sources override earlier ones:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml`
    /// 3. Environment variables, e.g. `MLSOLID_REDIS__URL=redis://cache:6379`
    ///
    /// # Errors
    ///
    /// Returns an error if a present source cannot be parsed
    pub fn load(config_dir: impl Into<PathBuf>, environment: &str) -> Result<Self, ConfigError> {
        let config_dir = config_dir.into();

        let config = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", environment))).required(false))
            .add_source(
                Environment::with_prefix("MLSOLID")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration, falling back to defaults when it cannot be read
    pub fn load_or_default(config_dir: impl Into<PathBuf>, environment: &str) -> Self {
        Self::load(config_dir, environment).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load configuration: {}", e);
            eprintln!("Using default configuration");
            Self::default()
        })
    }
}
