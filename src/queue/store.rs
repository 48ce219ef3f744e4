use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use prost::Message;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use super::{JobQueue, QueueError, Result};
use crate::proto::{DeadLetter, QueueEntry};

const NEXT_SEQ_KEY: &[u8] = b"next_seq";

/// FjallJobQueue keeps the job FIFO in an embedded Fjall keyspace
///
/// Architecture:
/// - `jobs` partition: u64 (big-endian) → QueueEntry (protobuf)
/// - `metadata` partition: "next_seq" → u64 (sequence counter)
/// - `dead_letters` partition: u64 (big-endian) → DeadLetter (protobuf)
///
/// Big-endian sequence keys make key order equal enqueue order, so the
/// head of the queue is simply the first key. Pops are serialised by an
/// async mutex, which is what gives in-process workers exclusive delivery.
/// Fjall locks its directory, so producers and consumers must share the
/// process that opened it.
pub struct FjallJobQueue {
    keyspace: Keyspace,
    jobs: PartitionHandle,
    metadata: PartitionHandle,
    dead_letters: PartitionHandle,
    seq_counter: AtomicU64,
    dead_counter: AtomicU64,
    pop_lock: Mutex<()>,
    available: Notify,
}

impl FjallJobQueue {
    /// Open or create a queue at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening FjallJobQueue at: {}", path.as_ref().display());

        let keyspace = Config::new(path).open()?;

        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;
        let dead_letters =
            keyspace.open_partition("dead_letters", PartitionCreateOptions::default())?;

        // Never reuse a sequence still present in the jobs partition
        let stored_seq = metadata.get(NEXT_SEQ_KEY)?.map(|bytes| decode_seq(&bytes)).unwrap_or(0);
        let after_last_job = jobs.last_key_value()?.map(|(key, _)| decode_seq(&key) + 1).unwrap_or(0);
        let next_seq = stored_seq.max(after_last_job);

        let next_dead = dead_letters
            .last_key_value()?
            .map(|(key, _)| decode_seq(&key) + 1)
            .unwrap_or(0);

        info!(next_seq, next_dead, "FjallJobQueue opened");

        Ok(Self {
            keyspace,
            jobs,
            metadata,
            dead_letters,
            seq_counter: AtomicU64::new(next_seq),
            dead_counter: AtomicU64::new(next_dead),
            pop_lock: Mutex::new(()),
            available: Notify::new(),
        })
    }

    /// Get current sequence counter value
    pub fn current_seq(&self) -> u64 {
        self.seq_counter.load(Ordering::SeqCst)
    }

    fn write_entry(&self, entry: &QueueEntry) -> Result<u64> {
        let seq = self.seq_counter.fetch_add(1, Ordering::SeqCst);

        self.jobs.insert(seq.to_be_bytes(), entry.encode_to_vec())?;
        self.metadata.insert(NEXT_SEQ_KEY, (seq + 1).to_be_bytes())?;
        self.keyspace.persist(PersistMode::Buffer)?;

        Ok(seq)
    }

    /// Remove and decode the head entry, if any
    async fn try_pop(&self) -> Result<Option<QueueEntry>> {
        let _guard = self.pop_lock.lock().await;

        let Some((key, value)) = self.jobs.first_key_value()? else {
            return Ok(None);
        };

        self.jobs.remove(key.clone())?;
        let seq = decode_seq(&key);

        // The entry is gone either way; an undecodable one must not wedge the head
        let entry = QueueEntry::decode(&*value)
            .map_err(|e| QueueError::Decode(format!("seq {seq}: {e}")))?;

        debug!(seq, content_hash = %entry.content_hash, "Entry dequeued");
        Ok(Some(entry))
    }
}

#[async_trait]
impl JobQueue for FjallJobQueue {
    async fn enqueue(&self, entry: &QueueEntry) -> Result<()> {
        let seq = self
            .write_entry(entry)
            .map_err(|e| QueueError::Write(e.to_string()))?;

        debug!(seq, content_hash = %entry.content_hash, "Entry enqueued");
        self.available.notify_one();
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<QueueEntry>> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            // Register interest before looking, so an enqueue landing between
            // the empty check and the wait still wakes us
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(entry) = self.try_pop().await? {
                return Ok(Some(entry));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn peek_all(&self) -> Result<Vec<QueueEntry>> {
        let mut entries = Vec::new();

        for item in self.jobs.iter() {
            let (key, value) = item?;
            match QueueEntry::decode(&*value) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(seq = decode_seq(&key), error = %e, "Skipping undecodable entry"),
            }
        }

        Ok(entries)
    }

    async fn dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        let seq = self.dead_counter.fetch_add(1, Ordering::SeqCst);

        self.dead_letters
            .insert(seq.to_be_bytes(), letter.encode_to_vec())
            .map_err(|e| QueueError::Write(e.to_string()))?;
        self.keyspace
            .persist(PersistMode::Buffer)
            .map_err(|e| QueueError::Write(e.to_string()))?;

        info!(seq, stage = %letter.stage, kind = %letter.failure_kind, "Job moved to dead letters");
        Ok(())
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>> {
        let mut results = Vec::new();

        for item in self.dead_letters.iter().take(limit) {
            let (_, value) = item?;
            let letter = DeadLetter::decode(&*value).map_err(|e| QueueError::Decode(e.to_string()))?;
            results.push(letter);
        }

        Ok(results)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.jobs.len()?)
    }

    async fn health(&self) -> Result<()> {
        let _ = self.metadata.get(NEXT_SEQ_KEY)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        info!("FjallJobQueue flushed");
        Ok(())
    }
}

fn decode_seq(bytes: &[u8]) -> u64 {
    u64::from_be_bytes(bytes.try_into().unwrap_or([0u8; 8]))
}
