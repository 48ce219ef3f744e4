//! Queue message schemas
//!
//! Messages derive `prost::Message` directly instead of going through a
//! `.proto` build step:
//! - `QueueEntry` - one pending separation job
//! - `DeadLetter` - a job that failed terminally, with the failing stage
//!
//! The embedded queue stores them as protobuf. Both also derive serde so the
//! Redis backend can keep the JSON shape other producers of the same list
//! already push (`{"songhash": ..., "callback": ...}`).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use prost::Message;
//! use stemsplit::proto::QueueEntry;
//!
//! let entry = QueueEntry::new(hash, Some("http://x/cb".to_string()));
//! let bytes = entry.encode_to_vec();
//! let decoded = QueueEntry::decode(&bytes[..])?;
//! ```

use serde::{Deserialize, Serialize};

use crate::addressing::{AddressError, ContentHash};

#[derive(Clone, PartialEq, Eq, Hash, prost::Message, Serialize, Deserialize)]
pub struct QueueEntry {
    #[prost(string, tag = "1")]
    #[serde(rename = "songhash")]
    pub content_hash: String,

    #[prost(string, optional, tag = "2")]
    #[serde(rename = "callback", default)]
    pub callback_url: Option<String>,

    /// Unix milliseconds at enqueue time; zero when the producer did not set it
    #[prost(uint64, tag = "3")]
    #[serde(default, skip_serializing_if = "is_zero")]
    pub enqueued_at_ms: u64,
}

impl QueueEntry {
    pub fn new(hash: ContentHash, callback_url: Option<String>) -> Self {
        Self {
            content_hash: hash.into_string(),
            callback_url,
            enqueued_at_ms: now_ms(),
        }
    }

    /// Hash carried by the entry, validated
    pub fn hash(&self) -> Result<ContentHash, AddressError> {
        ContentHash::parse(&self.content_hash)
    }

    /// Callback URL, treating an empty string the same as absent
    pub fn callback(&self) -> Option<&str> {
        self.callback_url.as_deref().filter(|url| !url.is_empty())
    }
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct DeadLetter {
    #[prost(message, optional, tag = "1")]
    pub entry: Option<QueueEntry>,

    /// Pipeline stage the job failed in (`downloading`, `processing`, `uploading`)
    #[prost(string, tag = "2")]
    pub stage: String,

    /// Error taxonomy name, e.g. `StorageNotFoundError`
    #[prost(string, tag = "3")]
    pub failure_kind: String,

    #[prost(string, tag = "4")]
    pub message: String,

    #[prost(uint64, tag = "5")]
    pub failed_at_ms: u64,
}

impl DeadLetter {
    pub fn new(
        entry: QueueEntry,
        stage: impl Into<String>,
        failure_kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entry: Some(entry),
            stage: stage.into(),
            failure_kind: failure_kind.into(),
            message: message.into(),
            failed_at_ms: now_ms(),
        }
    }
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// Current Unix timestamp in milliseconds
pub(crate) fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
