//! Request and response bodies of the `/apiv1` surface.
//!
//! Submitting a song (`POST /apiv1/separate`):
//!
//! ```json
//! {
//!   "song_name": "demo.mp3",
//!   "mp3": "<base64 of the mp3 bytes>",
//!   "callback": { "url": "https://client.example.com/done" }
//! }
//! ```
//!
//! The answer carries the content hash that addresses every track of the
//! song: `{"hash": "<64 hex>", "reason": "Song enqueued for separation"}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::proto::DeadLetter;

pub const ENQUEUED_REASON: &str = "Song enqueued for separation";

#[derive(Debug, Deserialize, Clone)]
pub struct SeparateRequest {
    /// Informational only; tracks are addressed by hash
    #[serde(default)]
    pub song_name: Option<String>,
    /// Base64 (standard alphabet, padded) of the mp3 file
    pub mp3: String,
    #[serde(default)]
    pub callback: Option<CallbackTarget>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CallbackTarget {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SeparateResponse {
    pub hash: String,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueueResponse {
    pub queue: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeadLettersQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DeadLettersResponse {
    pub dead_letters: Vec<DeadLetter>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, String>,
    pub version: String,
}
