//! Completion callbacks to submitter-provided URLs

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("callback request failed: {0}")]
    RequestFailed(String),

    #[error("callback timed out")]
    Timeout,

    #[error("callback endpoint answered HTTP {0}")]
    Rejected(u16),
}

impl CallbackError {
    /// Error taxonomy name
    pub fn kind(&self) -> &'static str {
        "CallbackDeliveryError"
    }
}

pub type Result<T> = std::result::Result<T, CallbackError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
}

/// Body POSTed to the callback URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub hash: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallbackPayload {
    pub fn completed(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            status: JobStatus::Completed,
            error: None,
        }
    }

    pub fn failed(hash: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            status: JobStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            user_agent: format!("stemsplit/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Fire-and-forget notifier: one attempt per job, no retries
#[derive(Debug, Clone)]
pub struct CallbackClient {
    client: Client,
}

impl CallbackClient {
    pub fn new(config: CallbackConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| CallbackError::RequestFailed(e.to_string()))?;

        Ok(Self { client })
    }

    /// POST the payload as JSON; any non-2xx answer is an error
    pub async fn notify(&self, url: &str, payload: &CallbackPayload) -> Result<()> {
        debug!(url, hash = %payload.hash, status = ?payload.status, "Sending callback");

        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallbackError::Timeout
                } else {
                    CallbackError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CallbackError::Rejected(status.as_u16()));
        }

        Ok(())
    }
}
