use reqwest::Url;
use thiserror::Error;

use super::models::SeparateRequest;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestValidationError {
    #[error("mp3 must not be empty")]
    EmptyAudio,
    #[error("callback url '{0}' must be an absolute http/https url")]
    InvalidCallbackUrl(String),
}

/// Check a submission and return its callback URL, if one was given.
///
/// A missing `callback`, a missing `url` and an empty `url` all mean
/// "do not notify".
pub fn validate_separate_request(
    request: &SeparateRequest,
) -> Result<Option<String>, RequestValidationError> {
    if request.mp3.trim().is_empty() {
        return Err(RequestValidationError::EmptyAudio);
    }

    let Some(url) = request
        .callback
        .as_ref()
        .and_then(|callback| callback.url.as_deref())
        .map(str::trim)
        .filter(|url| !url.is_empty())
    else {
        return Ok(None);
    };

    let parsed =
        Url::parse(url).map_err(|_| RequestValidationError::InvalidCallbackUrl(url.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(RequestValidationError::InvalidCallbackUrl(url.to_string()));
    }

    Ok(Some(url.to_string()))
}
