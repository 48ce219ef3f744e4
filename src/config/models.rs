use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub separator: SeparatorConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Largest accepted submission body (base64 inflates audio by ~4/3)
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 5050))
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(64 * 1024 * 1024)
}

/// Queue backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// Embedded keyspace; producers and consumers must share one process
    #[default]
    Fjall,
    /// Redis list shared by any number of processes
    Redis,
}

/// Job queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,
    #[serde(default = "default_fjall_path")]
    pub fjall_path: PathBuf,
    #[serde(default = "default_redis_host")]
    pub redis_host: String,
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
    /// Name of the single logical queue
    #[serde(default = "default_queue_key")]
    pub key: String,
}

impl QueueConfig {
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            fjall_path: default_fjall_path(),
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            key: default_queue_key(),
        }
    }
}

fn default_fjall_path() -> PathBuf {
    PathBuf::from("data/queue")
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_queue_key() -> String {
    "toWorker".to_string()
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Memory,
    #[default]
    Local,
    S3,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    /// Container (bucket) holding every `{hash}/{track}.mp3` object
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Root directory for the local provider
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// S3-compatible endpoint, e.g. `http://localhost:9000` for MinIO
    pub endpoint: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
    /// S3 access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// S3 secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            bucket: default_bucket(),
            root: default_storage_root(),
            endpoint: None,
            region: None,
            allow_http: false,
            access_key: None,
            secret_key: None,
        }
    }
}

fn default_bucket() -> String {
    "songs".to_string()
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/objects")
}

/// Worker loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Workers spawned by one process; each handles one job at a time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Parent directory for per-job scratch directories
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Longest single wait on the queue before re-checking for shutdown
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_processing_timeout_secs")]
    pub processing_timeout_secs: u64,
    #[serde(default = "default_callback_timeout_secs")]
    pub callback_timeout_secs: u64,
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            work_dir: default_work_dir(),
            poll_interval_secs: default_poll_interval_secs(),
            processing_timeout_secs: default_processing_timeout_secs(),
            callback_timeout_secs: default_callback_timeout_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("stemsplit")
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_processing_timeout_secs() -> u64 {
    30 * 60
}

fn default_callback_timeout_secs() -> u64 {
    10
}

/// External separation tool invocation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeparatorConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before `--out`, `--mp3`, model and input
    #[serde(default = "default_program_args")]
    pub args: Vec<String>,
    /// Model name; also the first directory level of the tool's output
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_tracks")]
    pub tracks: Vec<String>,
}

impl Default for SeparatorConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_program_args(),
            model: default_model(),
            tracks: default_tracks(),
        }
    }
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_program_args() -> Vec<String> {
    vec!["-m".to_string(), "demucs.separate".to_string()]
}

fn default_model() -> String {
    "mdx_extra_q".to_string()
}

fn default_tracks() -> Vec<String> {
    crate::addressing::RESULT_TRACKS
        .iter()
        .map(|track| track.to_string())
        .collect()
}
