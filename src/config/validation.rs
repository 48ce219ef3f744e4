use super::models::{Config, StorageProvider};
use crate::addressing::validate_track_name;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("Separator track '{0}' is not a valid track name")]
    InvalidTrackName(String),

    #[error("Separator track '{0}' is listed more than once")]
    DuplicateTrack(String),

    #[error("Storage provider is S3 but missing credentials (access_key or secret_key)")]
    MissingS3Credentials,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_server(config)?;
    validate_queue(config)?;
    validate_storage(config)?;
    validate_worker(config)?;
    validate_separator(config)?;
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    if config.server.max_payload_bytes.as_u64() == 0 {
        return Err(ValidationError::NotPositive {
            field: "server.max_payload_bytes",
        });
    }
    Ok(())
}

fn validate_queue(config: &Config) -> Result<(), ValidationError> {
    if config.queue.key.trim().is_empty() {
        return Err(ValidationError::Empty { field: "queue.key" });
    }
    if config.queue.redis_host.trim().is_empty() {
        return Err(ValidationError::Empty {
            field: "queue.redis_host",
        });
    }
    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.bucket.trim().is_empty() {
        return Err(ValidationError::Empty {
            field: "storage.bucket",
        });
    }

    if config.storage.provider == StorageProvider::S3
        && (config.storage.access_key.is_none() || config.storage.secret_key.is_none())
    {
        return Err(ValidationError::MissingS3Credentials);
    }

    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    let worker = &config.worker;

    let positives = [
        ("worker.concurrency", worker.concurrency as u64),
        ("worker.poll_interval_secs", worker.poll_interval_secs),
        ("worker.processing_timeout_secs", worker.processing_timeout_secs),
        ("worker.callback_timeout_secs", worker.callback_timeout_secs),
    ];

    for (field, value) in positives {
        if value == 0 {
            return Err(ValidationError::NotPositive { field });
        }
    }

    Ok(())
}

fn validate_separator(config: &Config) -> Result<(), ValidationError> {
    let separator = &config.separator;

    if separator.program.trim().is_empty() {
        return Err(ValidationError::Empty {
            field: "separator.program",
        });
    }
    if separator.tracks.is_empty() {
        return Err(ValidationError::Empty {
            field: "separator.tracks",
        });
    }

    let mut seen = std::collections::HashSet::new();
    for track in &separator.tracks {
        validate_track_name(track).map_err(|_| ValidationError::InvalidTrackName(track.clone()))?;
        if track == crate::addressing::ORIGINAL_TRACK || !seen.insert(track.as_str()) {
            return Err(ValidationError::DuplicateTrack(track.clone()));
        }
    }

    Ok(())
}
