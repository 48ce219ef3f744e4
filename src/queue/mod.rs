//! Durable FIFO of pending separation jobs
//!
//! One logical queue shared by every submitter and worker. `dequeue` hands
//! each entry to exactly one caller; it is the only coordination point
//! between workers, so there are no leases and no redelivery. Jobs that fail
//! terminally are recorded in a dead-letter list next to the queue.

pub mod redis_queue;
pub mod store;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{QueueBackend, QueueConfig};
use crate::proto::{DeadLetter, QueueEntry};

pub use redis_queue::RedisJobQueue;
pub use store::FjallJobQueue;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue write failed: {0}")]
    Write(String),

    #[error("Queue read failed: {0}")]
    Read(String),

    #[error("Undecodable queue entry: {0}")]
    Decode(String),

    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl QueueError {
    /// Error taxonomy name
    pub fn kind(&self) -> &'static str {
        match self {
            QueueError::Write(_) => "QueueWriteError",
            QueueError::Decode(_) => "QueueDecodeError",
            _ => "QueueReadError",
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append an entry at the tail
    async fn enqueue(&self, entry: &QueueEntry) -> Result<()>;

    /// Remove and return the head entry, waiting up to `wait` for one to
    /// arrive. Each entry is returned to exactly one caller.
    async fn dequeue(&self, wait: Duration) -> Result<Option<QueueEntry>>;

    /// Snapshot of pending entries, oldest (next to be dequeued) first
    async fn peek_all(&self) -> Result<Vec<QueueEntry>>;

    /// Record a job that failed terminally
    async fn dead_letter(&self, letter: &DeadLetter) -> Result<()>;

    /// Up to `limit` dead letters, oldest first
    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>>;

    /// Number of pending entries
    async fn len(&self) -> Result<usize>;

    /// Health check - verify the backing store is reachable
    async fn health(&self) -> Result<()>;

    /// Flush pending writes before shutdown
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Open the backend selected by configuration
pub async fn open(config: &QueueConfig) -> Result<Arc<dyn JobQueue>> {
    match config.backend {
        QueueBackend::Fjall => Ok(Arc::new(FjallJobQueue::open(&config.fjall_path)?)),
        QueueBackend::Redis => Ok(Arc::new(
            RedisJobQueue::connect(&config.redis_url(), &config.key).await?,
        )),
    }
}
