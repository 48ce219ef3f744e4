//! Content addressing for submitted audio
//!
//! A submission is identified by the SHA-256 digest of its base64 text. The
//! digest doubles as the queue correlation key and the storage namespace, so
//! every blob for a song lives under `{hash}/`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Blob name of the submitted audio
pub const ORIGINAL_TRACK: &str = "original";

/// Result tracks written by the worker, in upload order
pub const RESULT_TRACKS: [&str; 4] = ["vocals", "drums", "bass", "other"];

const HASH_HEX_LEN: usize = 64;
const MAX_TRACK_NAME_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("content hash must be 64 hex characters, got '{0}'")]
    InvalidHash(String),

    #[error("track name '{0}' must be 1-64 characters of [A-Za-z0-9_-]")]
    InvalidTrackName(String),
}

/// Lowercase hex SHA-256 digest identifying one submitted payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Validate an externally supplied hash (path segments, queue entries)
    pub fn parse(value: &str) -> Result<Self, AddressError> {
        if value.len() != HASH_HEX_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidHash(value.to_string()));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hash the transport encoding of a payload.
///
/// The input is the base64 text exactly as received, not the decoded audio,
/// so two encodings of the same bytes address different namespaces.
pub fn content_hash(payload: &str) -> ContentHash {
    let digest = Sha256::digest(payload.as_bytes());
    ContentHash(hex::encode(digest))
}

/// Validate a track name before it becomes part of an object key
pub fn validate_track_name(name: &str) -> Result<(), AddressError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_TRACK_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    if valid {
        Ok(())
    } else {
        Err(AddressError::InvalidTrackName(name.to_string()))
    }
}

/// Object key for a named track: `{hash}/{name}.mp3`
pub fn blob_key(hash: &ContentHash, name: &str) -> String {
    format!("{}/{}.mp3", hash, name)
}
