//! Source separation capability
//!
//! The worker only knows the [`Separator`] trait: give it a local input file
//! and a scratch directory, get back where each named track was written.
//! [`DemucsSeparator`] is the subprocess adapter used in deployments; tests
//! plug in their own implementation.

mod demucs;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use demucs::DemucsSeparator;

/// Track name → local file the separator wrote (or was expected to write)
pub type SeparatedTracks = BTreeMap<String, PathBuf>;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("failed to start separator '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("separator exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("separator timed out after {0}s")]
    Timeout(u64),

    #[error("invalid input file: {0}")]
    InvalidInput(String),
}

impl ProcessingError {
    /// Error taxonomy name
    pub fn kind(&self) -> &'static str {
        "ProcessingFailure"
    }
}

#[async_trait]
pub trait Separator: Send + Sync {
    /// Names of the tracks every successful run produces
    fn tracks(&self) -> &[String];

    /// Split `input` into tracks written under `out_dir`.
    ///
    /// The returned map has one path per name in [`Separator::tracks`]. A
    /// path may still be missing on disk if the tool misbehaved; uploading
    /// reports that per track.
    async fn separate(&self, input: &Path, out_dir: &Path)
    -> Result<SeparatedTracks, ProcessingError>;
}
