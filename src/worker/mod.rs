//! Separation worker
//!
//! A worker takes one queue entry at a time and drives it through
//! downloading, processing, uploading and notifying. Jobs that fail are
//! recorded as dead letters and their submitter (if any) is told so.
//! Several workers may share one queue; each entry reaches exactly one.

pub mod callback;
mod runner;

use bon::Builder;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

use crate::observability::Metrics;
use crate::processing::Separator;
use crate::proto::{DeadLetter, QueueEntry};
use crate::queue::{JobQueue, QueueError};
use crate::storage::StorageClient;

pub use callback::{CallbackClient, CallbackConfig, CallbackError, CallbackPayload, JobStatus};
pub use runner::{JobError, JobReport, TrackFailure};

/// Pipeline stage of a job inside a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Waiting,
    Downloading,
    Processing,
    Uploading,
    Notifying,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Waiting => "waiting",
            JobStage::Downloading => "downloading",
            JobStage::Processing => "processing",
            JobStage::Uploading => "uploading",
            JobStage::Notifying => "notifying",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Builder)]
pub struct Worker {
    #[builder(default)]
    id: usize,
    queue: Arc<dyn JobQueue>,
    storage: Arc<StorageClient>,
    separator: Arc<dyn Separator>,
    callbacks: CallbackClient,
    #[builder(default)]
    metrics: Arc<Metrics>,
    #[builder(into)]
    work_dir: PathBuf,
    #[builder(default = Duration::from_secs(5))]
    poll_interval: Duration,
    #[builder(default = Duration::from_secs(30 * 60))]
    processing_timeout: Duration,
}

impl Worker {
    /// Run until `shutdown` flips to true or its sender is dropped.
    ///
    /// Shutdown is checked between jobs and between queue waits, so a job
    /// already taken off the queue always runs to the end.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = self.id, "Worker started");

        loop {
            if *shutdown.borrow_and_update() || shutdown.has_changed().is_err() {
                break;
            }

            match self.queue.dequeue(self.poll_interval).await {
                Ok(Some(entry)) => self.handle(entry).await,
                Ok(None) => {}
                Err(QueueError::Decode(e)) => {
                    // already removed from the queue; nothing left to retry
                    warn!(worker_id = self.id, error = %e, "Discarded undecodable queue entry");
                }
                Err(e) => {
                    error!(worker_id = self.id, error = %e, "Queue read failed");
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!(worker_id = self.id, "Worker stopped");
    }

    /// Spawn the worker on the runtime
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Process one entry end to end, including dead-lettering and notifying
    pub async fn handle(&self, entry: QueueEntry) {
        let span = info_span!("job", worker_id = self.id, hash = %entry.content_hash);

        async {
            let outcome = self.process(&entry).await;

            let payload = match &outcome {
                Ok(report) => {
                    self.metrics.job_completed();
                    info!(
                        tracks = report.tracks.len(),
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        "Job completed"
                    );
                    CallbackPayload::completed(report.hash.as_str())
                }
                Err(err) => {
                    self.metrics.job_failed();
                    error!(stage = %err.stage(), kind = err.kind(), error = %err, "Job failed");
                    self.record_dead_letter(&entry, err).await;
                    CallbackPayload::failed(entry.content_hash.clone(), err.to_string())
                }
            };

            self.notify(&entry, &payload).await;
        }
        .instrument(span)
        .await
    }

    async fn record_dead_letter(&self, entry: &QueueEntry, err: &JobError) {
        let letter = DeadLetter::new(
            entry.clone(),
            err.stage().as_str(),
            err.kind(),
            err.to_string(),
        );

        if let Err(e) = self.queue.dead_letter(&letter).await {
            error!(error = %e, "Failed to record dead letter");
        }
    }

    async fn notify(&self, entry: &QueueEntry, payload: &CallbackPayload) {
        let Some(url) = entry.callback() else {
            return;
        };

        info!(stage = %JobStage::Notifying, url, status = ?payload.status, "Notifying submitter");

        if let Err(e) = self.callbacks.notify(url, payload).await {
            self.metrics.callback_failed();
            warn!(url, kind = e.kind(), error = %e, "Callback delivery failed");
        }
    }
}
