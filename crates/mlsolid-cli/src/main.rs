//! mlsolid command-line interface
//!
//! Wires the metadata store and object store into the service layer and runs
//! one subcommand against them. Results are printed as JSON on stdout.

mod commands;
mod config;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use mlsolid_db::{
    mask_redis_url, FileSystemObjectStore, MemoryKvStore, MemoryObjectStore, ObjectStore, ObjectStoreConfig,
    RedisConfig, RedisKvStore, SolidStore,
};
use mlsolid_service::{ErrorKind, ServiceError, ServiceRegistry};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use commands::Command;
use config::CliConfig;
use telemetry::TelemetryConfig;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Experiment tracking and model registry store", long_about = None)]
struct Args {
    /// Configuration directory
    #[arg(short, long, env = "CONFIG_DIR", default_value = "config", global = true)]
    config_dir: String,

    /// Environment (development, production, etc.)
    #[arg(short, long, env = "ENVIRONMENT", default_value = "development", global = true)]
    environment: String,

    /// Metadata store URL
    #[arg(long, env = "REDIS_URL", global = true)]
    redis_url: Option<String>,

    /// Object store root directory
    #[arg(long, global = true)]
    object_root: Option<PathBuf>,

    /// Object key prefix
    #[arg(long, global = true)]
    object_prefix: Option<String>,

    /// Log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Use in-process stores that live only as long as this command
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = CliConfig::load_or_default(&args.config_dir, &args.environment);

    // Override with command-line arguments
    if let Some(url) = args.redis_url {
        config.redis.url = url;
    }
    if let Some(root) = args.object_root {
        config.object_store.root = Some(root);
    }
    if let Some(prefix) = args.object_prefix {
        config.object_store.prefix = prefix;
    }

    let mut telemetry_config = TelemetryConfig::from(&config.logging);
    if let Some(level) = args.log_level {
        telemetry_config = telemetry_config.with_log_level(level);
    }
    if args.log_json {
        telemetry_config = telemetry_config.with_json_format(true);
    }
    telemetry::init_with_config(telemetry_config);
    debug!("Environment: {}", args.environment);

    let services = build_services(&config, args.memory).await?;
    args.command.execute(&services).await
}

/// Connect the stores and build the service registry
async fn build_services(config: &CliConfig, memory: bool) -> Result<ServiceRegistry> {
    if memory {
        info!("Using in-memory stores");
        let store =
            SolidStore::new(Arc::new(MemoryKvStore::new())).with_max_retries(config.redis.transaction_max_retries);
        let objects: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new(config.object_store.prefix.clone()));
        return Ok(ServiceRegistry::new(store, Some(objects)));
    }

    info!("Metadata store: {}", mask_redis_url(&config.redis.url));
    let redis_config = RedisConfig::new(config.redis.url.clone())
        .max_retries(config.redis.transaction_max_retries)
        .connect_timeout(Duration::from_secs(config.redis.connect_timeout_seconds));
    let kv = RedisKvStore::new(redis_config)
        .await
        .context("Failed to connect to the metadata store")?;
    let store = SolidStore::new(Arc::new(kv)).with_max_retries(config.redis.transaction_max_retries);

    let objects: Option<Arc<dyn ObjectStore>> = match &config.object_store.root {
        Some(root) => {
            let object_config = ObjectStoreConfig::new(root).prefix(config.object_store.prefix.clone());
            let fs = FileSystemObjectStore::new(object_config)
                .await
                .context("Failed to open the object store")?;
            Some(Arc::new(fs) as Arc<dyn ObjectStore>)
        }
        None => {
            warn!("No object store root configured; artifact operations are disabled");
            None
        }
    };

    Ok(ServiceRegistry::new(store, objects))
}

/// Exit status per error kind
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ServiceError>().map(ServiceError::kind) {
        Some(ErrorKind::NotFound) => 2,
        Some(ErrorKind::AlreadyInUse) => 3,
        Some(ErrorKind::InvalidInput) | Some(ErrorKind::BadRequest) => 4,
        Some(ErrorKind::NotInitialized) => 5,
        Some(ErrorKind::Internal) | None => 1,
    }
}
