//! Configuration management for stemsplit
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use stemsplit::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `STEMSPLIT__<section>__<key>`
//!
//! Examples:
//! - `STEMSPLIT__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `STEMSPLIT__QUEUE__BACKEND=redis`
//! - `STEMSPLIT__WORKER__CONCURRENCY=4`
//!
//! Container deployments can instead set `REDIS_HOST`, `REDIS_PORT`,
//! `MINIO_HOST` and `MINIO_BUCKET_NAME`. Storage credentials come only from
//! `S3_ACCESS_KEY`/`S3_SECRET_KEY` (or the `AWS_*` equivalents).
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/stemsplit.toml`.
//! This can be overridden using the `STEMSPLIT_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

// Re-export public types
pub use crate::humanize::ByteSize;
pub use models::{
    Config, QueueBackend, QueueConfig, SeparatorConfig, ServerConfig, StorageConfig,
    StorageProvider, WorkerConfig,
};
pub use sources::apply_deployment_env;
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Deployment variables and secrets (`REDIS_HOST`, `S3_ACCESS_KEY`, ...)
    /// 2. Environment variables (`STEMSPLIT__*`)
    /// 3. TOML file (default: `config/stemsplit.toml`)
    /// 4. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Run validation on a config built in code
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }
}
