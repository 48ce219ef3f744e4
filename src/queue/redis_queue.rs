use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{JobQueue, QueueError, Result};
use crate::proto::{DeadLetter, QueueEntry};

// BLPOP treats 0 as "block forever"
const MIN_BLOCK_SECS: f64 = 0.01;

/// Job queue on a Redis list, shared across processes
///
/// Entries are JSON (`{"songhash": ..., "callback": ...}`), pushed with
/// RPUSH and taken with BLPOP, so the list head is the oldest entry and
/// LRANGE 0 -1 reads in dequeue order. Redis executes BLPOP atomically,
/// which gives exclusive delivery between any number of worker processes.
/// Dead letters live in a sibling list `{key}:dead`.
pub struct RedisJobQueue {
    client: Client,
    conn: MultiplexedConnection,
    blocking: IdlePool<MultiplexedConnection>,
    key: String,
    dead_key: String,
}

/// Connections parked between uses
///
/// A blocking command stalls every request multiplexed on its connection, so
/// each BLPOP runs on a connection it holds alone. Connections are opened on
/// demand and handed back after a clean reply; one that errored is dropped.
struct IdlePool<T> {
    idle: Mutex<Vec<T>>,
}

impl<T> IdlePool<T> {
    fn new() -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
        }
    }

    async fn take(&self) -> Option<T> {
        self.idle.lock().await.pop()
    }

    async fn put_back(&self, conn: T) {
        self.idle.lock().await.push(conn);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.idle.lock().await.len()
    }
}

impl RedisJobQueue {
    pub async fn connect(url: &str, key: &str) -> Result<Self> {
        info!(url, key, "Connecting RedisJobQueue");

        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;

        Ok(Self {
            client,
            conn,
            blocking: IdlePool::new(),
            key: key.to_string(),
            dead_key: format!("{key}:dead"),
        })
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, entry: &QueueEntry) -> Result<()> {
        let payload = encode_entry(entry)?;
        let mut conn = self.conn.clone();

        conn.rpush::<_, _, ()>(&self.key, payload)
            .await
            .map_err(|e| QueueError::Write(e.to_string()))?;

        debug!(key = %self.key, content_hash = %entry.content_hash, "Entry enqueued");
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<QueueEntry>> {
        let mut conn = match self.blocking.take().await {
            Some(conn) => conn,
            None => {
                debug!(key = %self.key, "Opening blocking connection");
                self.client.get_multiplexed_async_connection().await?
            }
        };
        let timeout = wait.as_secs_f64().max(MIN_BLOCK_SECS);

        let popped: Option<(String, String)> = conn.blpop(&self.key, timeout).await?;
        self.blocking.put_back(conn).await;

        match popped {
            Some((_, payload)) => {
                let entry = decode_entry(&payload)?;
                debug!(key = %self.key, content_hash = %entry.content_hash, "Entry dequeued");
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    async fn peek_all(&self) -> Result<Vec<QueueEntry>> {
        let mut conn = self.conn.clone();
        let payloads: Vec<String> = conn.lrange(&self.key, 0, -1).await?;

        let entries = payloads
            .iter()
            .filter_map(|payload| match decode_entry(payload) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "Skipping undecodable entry");
                    None
                }
            })
            .collect();

        Ok(entries)
    }

    async fn dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        let payload =
            serde_json::to_string(letter).map_err(|e| QueueError::Write(e.to_string()))?;
        let mut conn = self.conn.clone();

        conn.rpush::<_, _, ()>(&self.dead_key, payload)
            .await
            .map_err(|e| QueueError::Write(e.to_string()))?;

        info!(key = %self.dead_key, stage = %letter.stage, kind = %letter.failure_kind, "Job moved to dead letters");
        Ok(())
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let stop = isize::try_from(limit - 1).unwrap_or(isize::MAX);
        let payloads: Vec<String> = conn.lrange(&self.dead_key, 0, stop).await?;

        payloads
            .iter()
            .map(|payload| {
                serde_json::from_str(payload).map_err(|e| QueueError::Decode(e.to_string()))
            })
            .collect()
    }

    async fn len(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(&self.key).await?)
    }

    async fn health(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

fn encode_entry(entry: &QueueEntry) -> Result<String> {
    serde_json::to_string(entry).map_err(|e| QueueError::Write(e.to_string()))
}

fn decode_entry(payload: &str) -> Result<QueueEntry> {
    serde_json::from_str(payload).map_err(|e| QueueError::Decode(e.to_string()))
}
