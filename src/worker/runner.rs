//! Stage runner - takes one queue entry from original to uploaded tracks

use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{JobStage, Worker};
use crate::addressing::{AddressError, ContentHash, ORIGINAL_TRACK, blob_key};
use crate::processing::ProcessingError;
use crate::proto::QueueEntry;
use crate::storage::{AUDIO_CONTENT_TYPE, StorageError};

/// One track that could not be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFailure {
    pub track: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid queue entry: {0}")]
    InvalidEntry(#[from] AddressError),

    #[error("could not fetch original: {0}")]
    Download(#[source] StorageError),

    #[error("scratch space unavailable: {0}")]
    Workspace(#[source] std::io::Error),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error("{}", summarize(.uploaded, .failures))]
    Upload {
        uploaded: Vec<String>,
        failures: Vec<TrackFailure>,
    },
}

impl JobError {
    pub fn stage(&self) -> JobStage {
        match self {
            JobError::InvalidEntry(_) | JobError::Download(_) => JobStage::Downloading,
            JobError::Workspace(_) | JobError::Processing(_) => JobStage::Processing,
            JobError::Upload { .. } => JobStage::Uploading,
        }
    }

    /// Error taxonomy name recorded in dead letters
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::InvalidEntry(_) => "InvalidEntry",
            JobError::Download(e) => e.kind(),
            JobError::Workspace(_) => "WorkspaceError",
            JobError::Processing(e) => e.kind(),
            JobError::Upload { .. } => "StorageWriteError",
        }
    }
}

fn summarize(uploaded: &[String], failures: &[TrackFailure]) -> String {
    let tracks = failures
        .iter()
        .map(|f| format!("{} ({})", f.track, f.reason))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "{} of {} tracks failed to upload: {tracks}",
        failures.len(),
        failures.len() + uploaded.len()
    )
}

/// What a completed job produced
#[derive(Debug, Clone)]
pub struct JobReport {
    pub hash: ContentHash,
    pub tracks: Vec<String>,
    pub elapsed: Duration,
}

impl Worker {
    pub(super) async fn process(&self, entry: &QueueEntry) -> Result<JobReport, JobError> {
        let started = Instant::now();
        let hash = entry.hash()?;

        debug!(stage = %JobStage::Downloading, "Fetching original");
        let original = self
            .storage
            .get(&blob_key(&hash, ORIGINAL_TRACK))
            .await
            .map_err(JobError::Download)?;

        // Removed on drop, whichever way the job ends
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(JobError::Workspace)?;
        let scratch = tempfile::Builder::new()
            .prefix("job-")
            .tempdir_in(&self.work_dir)
            .map_err(JobError::Workspace)?;

        let input = scratch.path().join(format!("{hash}.mp3"));
        tokio::fs::write(&input, &original)
            .await
            .map_err(JobError::Workspace)?;

        info!(stage = %JobStage::Processing, size = original.len(), "Separating");
        let out_dir = scratch.path().join("separated");
        let separated = tokio::time::timeout(
            self.processing_timeout,
            self.separator.separate(&input, &out_dir),
        )
        .await
        .map_err(|_| ProcessingError::Timeout(self.processing_timeout.as_secs()))??;

        debug!(stage = %JobStage::Uploading, "Uploading tracks");
        let mut uploaded = Vec::new();
        let mut failures = Vec::new();

        // Every track is attempted even after one fails
        for track in self.separator.tracks() {
            let Some(path) = separated.get(track) else {
                failures.push(TrackFailure {
                    track: track.clone(),
                    reason: "separator produced no output".to_string(),
                });
                continue;
            };

            let data = match tokio::fs::read(path).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(track, path = %path.display(), error = %e, "Separated track unreadable");
                    failures.push(TrackFailure {
                        track: track.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match self
                .storage
                .put(&blob_key(&hash, track), data, AUDIO_CONTENT_TYPE)
                .await
            {
                Ok(()) => uploaded.push(track.clone()),
                Err(e) => {
                    warn!(track, error = %e, "Track upload failed");
                    failures.push(TrackFailure {
                        track: track.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(JobError::Upload { uploaded, failures });
        }

        Ok(JobReport {
            hash,
            tracks: uploaded,
            elapsed: started.elapsed(),
        })
    }
}
