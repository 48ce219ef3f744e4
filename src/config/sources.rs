use super::models::{Config, QueueBackend, StorageProvider};
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "STEMSPLIT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/stemsplit.toml";
const ENV_PREFIX: &str = "STEMSPLIT";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. `STEMSPLIT__*` environment variables
/// 5. Deployment variables (`REDIS_HOST`, `MINIO_HOST`, ...) and secrets
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;

    apply_deployment_env(&mut config, |name| env::var(name).ok())?;

    Ok(config)
}

/// Apply the plain variables container deployments set for the queue and
/// object store, plus storage secrets. Secrets are never read from files.
pub fn apply_deployment_env<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("REDIS_HOST") {
        config.queue.backend = QueueBackend::Redis;
        config.queue.redis_host = host;
    }
    if let Some(port) = lookup("REDIS_PORT") {
        config.queue.redis_port = port
            .parse()
            .map_err(|_| ConfigError::Message(format!("REDIS_PORT is not a port: {port}")))?;
    }

    // MINIO_HOST is host:port without a scheme
    if let Some(host) = lookup("MINIO_HOST") {
        config.storage.provider = StorageProvider::S3;
        if host.starts_with("http://") || host.starts_with("https://") {
            config.storage.allow_http = host.starts_with("http://");
            config.storage.endpoint = Some(host);
        } else {
            config.storage.allow_http = true;
            config.storage.endpoint = Some(format!("http://{host}"));
        }
        if config.storage.region.is_none() {
            config.storage.region = Some("us-east-1".to_string());
        }
    }
    if let Some(bucket) = lookup("MINIO_BUCKET_NAME") {
        config.storage.bucket = bucket;
    }

    config.storage.access_key = lookup("S3_ACCESS_KEY").or_else(|| lookup("AWS_ACCESS_KEY_ID"));
    config.storage.secret_key =
        lookup("S3_SECRET_KEY").or_else(|| lookup("AWS_SECRET_ACCESS_KEY"));

    Ok(())
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // STEMSPLIT__QUEUE__BACKEND -> queue.backend
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:5050");
        assert_eq!(config.storage.bucket, "songs");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"
max_payload_bytes = "10MB"

[queue]
backend = "redis"
redis_host = "queue.internal"
key = "jobs"

[storage]
provider = "memory"
bucket = "stems"

[worker]
concurrency = 4
processing_timeout_secs = 600

[separator]
model = "htdemucs"
tracks = ["vocals", "accompaniment"]
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.server.max_payload_bytes.as_u64(), 10 * 1024 * 1024);
        assert_eq!(config.queue.backend, QueueBackend::Redis);
        assert_eq!(config.queue.redis_url(), "redis://queue.internal:6379/");
        assert_eq!(config.queue.key, "jobs");
        assert_eq!(config.storage.provider, StorageProvider::Memory);
        assert_eq!(config.storage.bucket, "stems");
        assert_eq!(config.worker.concurrency, 4);
        assert_eq!(config.worker.processing_timeout().as_secs(), 600);
        assert_eq!(config.separator.model, "htdemucs");
        assert_eq!(config.separator.tracks.len(), 2);
    }

    #[test]
    fn test_deployment_env_switches_backends() {
        let mut config = Config::default();
        let lookup = lookup_from(&[
            ("REDIS_HOST", "redis"),
            ("REDIS_PORT", "6380"),
            ("MINIO_HOST", "minio:9000"),
            ("MINIO_BUCKET_NAME", "tracks"),
            ("S3_ACCESS_KEY", "rootuser"),
            ("AWS_SECRET_ACCESS_KEY", "rootpass123"),
        ]);

        apply_deployment_env(&mut config, lookup).unwrap();

        assert_eq!(config.queue.backend, QueueBackend::Redis);
        assert_eq!(config.queue.redis_url(), "redis://redis:6380/");
        assert_eq!(config.storage.provider, StorageProvider::S3);
        assert_eq!(config.storage.endpoint.as_deref(), Some("http://minio:9000"));
        assert!(config.storage.allow_http);
        assert_eq!(config.storage.bucket, "tracks");
        assert_eq!(config.storage.access_key.as_deref(), Some("rootuser"));
        assert_eq!(config.storage.secret_key.as_deref(), Some("rootpass123"));
    }

    #[test]
    fn test_deployment_env_absent_keeps_defaults() {
        let mut config = Config::default();
        apply_deployment_env(&mut config, lookup_from(&[])).unwrap();

        assert_eq!(config.queue.backend, QueueBackend::Fjall);
        assert_eq!(config.storage.provider, StorageProvider::Local);
        assert!(config.storage.access_key.is_none());
    }

    #[test]
    fn test_deployment_env_rejects_bad_port() {
        let mut config = Config::default();
        let result = apply_deployment_env(&mut config, lookup_from(&[("REDIS_PORT", "redis")]));
        assert!(result.is_err());
    }
}
