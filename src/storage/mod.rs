//! Object storage gateway for original and separated tracks
//! Uses Apache Arrow object_store crate
//!
//! One client is bound to one container (bucket). Keys follow the
//! `{hash}/{track}.mp3` layout produced by [`crate::addressing::blob_key`].
//! Failures are passed upward untouched; nothing here retries.

use bytes::Bytes;
use object_store::{
    Attribute, Attributes, ObjectStore, PutOptions,
    aws::{AmazonS3, AmazonS3Builder},
    local::LocalFileSystem,
    memory::InMemory,
    path::Path as StoragePath,
    signer::Signer,
};
use reqwest::{Method, StatusCode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{StorageConfig, StorageProvider};

pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

const DEFAULT_S3_REGION: &str = "us-east-1";
const BUCKET_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SIGNED_URL_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage write failed: {0}")]
    Write(String),

    #[error("storage read failed: {0}")]
    Read(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(#[from] object_store::Error),
}

impl StorageError {
    /// Error taxonomy name recorded in dead letters
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::Write(_) => "StorageWriteError",
            StorageError::Read(_) | StorageError::Backend(_) => "StorageReadError",
            StorageError::NotFound(_) => "StorageNotFoundError",
        }
    }
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Which object_store implementation sits behind the client
#[derive(Debug, Clone)]
enum Backend {
    Memory,
    Local { container_dir: PathBuf },
    S3(S3Bucket),
}

/// Bucket-level S3 calls object_store does not expose, sent as presigned
/// requests so they reuse the store's credentials and SigV4 signing
#[derive(Debug, Clone)]
struct S3Bucket {
    signer: Arc<AmazonS3>,
    http: reqwest::Client,
    region: String,
}

impl S3Bucket {
    async fn send(
        &self,
        method: Method,
        body: Option<String>,
    ) -> std::result::Result<StatusCode, String> {
        // The empty object path addresses the bucket itself
        let url = self
            .signer
            .signed_url(method.clone(), &StoragePath::from(""), SIGNED_URL_TTL)
            .await
            .map_err(|e| e.to_string())?;

        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        Ok(response.status())
    }

    /// HeadBucket: one request regardless of how many objects the bucket holds
    async fn head(&self, bucket: &str) -> Result<()> {
        let status = self
            .send(Method::HEAD, None)
            .await
            .map_err(|e| StorageError::Read(format!("bucket '{bucket}': {e}")))?;

        match status {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(bucket.to_string())),
            status => Err(StorageError::Read(format!("bucket '{bucket}': HTTP {status}"))),
        }
    }

    /// CreateBucket; losing a creation race to another process is fine
    async fn create(&self, bucket: &str) -> Result<()> {
        let body = (self.region != DEFAULT_S3_REGION).then(|| location_constraint(&self.region));
        let status = self
            .send(Method::PUT, body)
            .await
            .map_err(|e| StorageError::Write(format!("create bucket '{bucket}': {e}")))?;

        if status.is_success() || status == StatusCode::CONFLICT {
            Ok(())
        } else {
            Err(StorageError::Write(format!("create bucket '{bucket}': HTTP {status}")))
        }
    }
}

fn location_constraint(region: &str) -> String {
    format!(
        r#"<CreateBucketConfiguration xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><LocationConstraint>{region}</LocationConstraint></CreateBucketConfiguration>"#
    )
}

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    container: String,
    backend: Backend,
}

impl StorageClient {
    /// Create in-memory storage for testing/development
    pub fn in_memory(container: impl Into<String>) -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            container: container.into(),
            backend: Backend::Memory,
        }
    }

    /// Filesystem storage rooted at `root/container`
    pub fn local(root: impl Into<PathBuf>, container: impl Into<String>) -> Result<Self> {
        let container = container.into();
        let container_dir = root.into().join(&container);
        create_container_dir(&container_dir)?;

        let store = LocalFileSystem::new_with_prefix(&container_dir)?;

        Ok(Self {
            store: Arc::new(store),
            container,
            backend: Backend::Local { container_dir },
        })
    }

    /// Build the client selected by configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.provider {
            StorageProvider::Memory => Ok(Self::in_memory(config.bucket.clone())),
            StorageProvider::Local => Self::local(config.root.clone(), config.bucket.clone()),
            StorageProvider::S3 => {
                let region = config.region.as_deref().unwrap_or(DEFAULT_S3_REGION);
                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(&config.bucket)
                    .with_region(region)
                    .with_allow_http(config.allow_http);

                if let Some(endpoint) = &config.endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if let Some(access_key) = &config.access_key {
                    builder = builder.with_access_key_id(access_key);
                }
                if let Some(secret_key) = &config.secret_key {
                    builder = builder.with_secret_access_key(secret_key);
                }

                let s3 = Arc::new(builder.build()?);
                let http = reqwest::Client::builder()
                    .timeout(BUCKET_REQUEST_TIMEOUT)
                    .build()
                    .map_err(|e| StorageError::Read(format!("bucket client: {e}")))?;

                Ok(Self {
                    store: s3.clone(),
                    container: config.bucket.clone(),
                    backend: Backend::S3(S3Bucket {
                        signer: s3,
                        http,
                        region: region.to_string(),
                    }),
                })
            }
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Create the container if it is absent; safe to call on every submission.
    pub async fn ensure_container(&self) -> Result<()> {
        match &self.backend {
            Backend::Memory => Ok(()),
            Backend::Local { container_dir } => create_container_dir(container_dir),
            Backend::S3(bucket) => match bucket.head(&self.container).await {
                Err(StorageError::NotFound(_)) => {
                    tracing::info!(container = %self.container, "Creating bucket");
                    bucket.create(&self.container).await
                }
                other => other.map_err(|e| {
                    StorageError::Write(format!("bucket '{}' unavailable: {}", self.container, e))
                }),
            },
        }
    }

    /// Upload bytes to storage, overwriting any existing object
    pub async fn put(&self, key: &str, data: impl Into<Bytes>, content_type: &str) -> Result<()> {
        let path = StoragePath::from(key);
        let data: Bytes = data.into();
        let size = data.len();

        let mut opts = PutOptions::default();
        if self.supports_attributes() {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            opts.attributes = attributes;
        }

        self.store
            .put_opts(&path, data.into(), opts)
            .await
            .map_err(|e| StorageError::Write(format!("{key}: {e}")))?;

        tracing::info!(container = %self.container, key, size, "Uploaded to storage");

        Ok(())
    }

    /// Download from storage
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        let path = StoragePath::from(key);

        let result = self.store.get(&path).await.map_err(|e| read_error(key, e))?;
        let bytes = result.bytes().await.map_err(|e| read_error(key, e))?;

        tracing::info!(container = %self.container, key, size = bytes.len(), "Downloaded from storage");

        Ok(bytes)
    }

    /// Delete an object; deleting a missing key succeeds
    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = StoragePath::from(key);

        match self.store.delete(&path).await {
            Ok(()) => {
                tracing::info!(container = %self.container, key, "Deleted from storage");
                Ok(())
            }
            Err(object_store::Error::NotFound { .. }) => {
                tracing::debug!(container = %self.container, key, "Delete of missing object");
                Ok(())
            }
            Err(e) => Err(StorageError::Write(format!("{key}: {e}"))),
        }
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(read_error(key, e)),
        }
    }

    /// Health check - verify the container exists and is reachable
    pub async fn health(&self) -> Result<()> {
        match &self.backend {
            Backend::Memory => Ok(()),
            Backend::Local { container_dir } => match tokio::fs::metadata(container_dir).await {
                Ok(meta) if meta.is_dir() => Ok(()),
                Ok(_) => Err(StorageError::Read(format!(
                    "{} is not a directory",
                    container_dir.display()
                ))),
                Err(e) => Err(StorageError::Read(format!("{}: {}", container_dir.display(), e))),
            },
            Backend::S3(bucket) => bucket.head(&self.container).await,
        }
    }

    // LocalFileSystem rejects puts that carry attributes
    fn supports_attributes(&self) -> bool {
        !matches!(self.backend, Backend::Local { .. })
    }
}

fn create_container_dir(dir: &std::path::Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| StorageError::Write(format!("create {}: {}", dir.display(), e)))
}

fn read_error(key: &str, err: object_store::Error) -> StorageError {
    match err {
        object_store::Error::NotFound { .. } => StorageError::NotFound(key.to_string()),
        other => StorageError::Read(format!("{key}: {other}")),
    }
}
