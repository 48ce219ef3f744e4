//! API utility functions
//!
//! Stateless helpers for request parsing and response headers, kept out of
//! services.rs so they can be unit tested.

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::api::error::ApiError;

/// Parses and validates Content-Type header for application/json
///
/// Accepts `application/json` with or without a charset parameter; rejects
/// `application/jsonp`, `application/json-patch+json`, `text/json` and
/// malformed media types.
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type))
    })?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

/// Collect a request body, failing once it grows past `max_size` bytes.
///
/// Runs after the decompression layer, so the limit applies to the
/// decompressed size.
pub async fn read_body(body: axum::body::Body, max_size: usize) -> Result<Bytes, ApiError> {
    let collected = Limited::new(body, max_size).collect().await.map_err(|err| {
        if err.downcast_ref::<LengthLimitError>().is_some() {
            ApiError::PayloadTooLarge(max_size)
        } else {
            ApiError::InvalidPayload(format!("failed to read body: {err}"))
        }
    })?;

    Ok(collected.to_bytes())
}

/// Decode the submitted base64 audio.
///
/// ASCII whitespace is dropped first, so line-wrapped output of tools like
/// `base64(1)` is accepted. The content hash is still taken over the text as
/// submitted.
pub fn decode_audio(text: &str) -> Result<Vec<u8>, ApiError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ApiError::Decode(e.to_string()))
}

/// `Content-Disposition` value offering the track as an mp3 download
pub fn attachment_disposition(track: &str) -> String {
    format!("attachment; filename=\"{track}.mp3\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_type_valid() {
        assert!(parse_content_type("application/json").is_ok());
        assert!(parse_content_type("application/json; charset=utf-8").is_ok());
        assert!(parse_content_type("application/json; charset=UTF-8").is_ok());
    }

    #[test]
    fn test_parse_content_type_invalid() {
        assert!(parse_content_type("application/jsonp").is_err());
        assert!(parse_content_type("application/json-patch+json").is_err());
        assert!(parse_content_type("text/json").is_err());
        assert!(parse_content_type("audio/mpeg").is_err());
        assert!(parse_content_type("invalid").is_err());
        assert!(parse_content_type("").is_err());
    }

    #[tokio::test]
    async fn test_read_body_within_limit() {
        let body = axum::body::Body::from(vec![7u8; 1000]);
        let data = read_body(body, 1000).await.unwrap();
        assert_eq!(data.len(), 1000);
    }

    #[tokio::test]
    async fn test_read_body_too_large() {
        let body = axum::body::Body::from(vec![7u8; 1000]);
        match read_body(body, 999).await {
            Err(ApiError::PayloadTooLarge(limit)) => assert_eq!(limit, 999),
            other => panic!("Expected PayloadTooLarge error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_audio_accepts_wrapped_lines() {
        let encoded = STANDARD.encode([7u8; 120]);
        let wrapped = encoded
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        assert!(wrapped.contains('\n'));

        assert_eq!(decode_audio(&wrapped).unwrap(), vec![7u8; 120]);
        assert_eq!(decode_audio(&format!("{wrapped}\r\n")).unwrap(), vec![7u8; 120]);
    }

    #[test]
    fn test_decode_audio_rejects_non_alphabet() {
        assert!(matches!(decode_audio("not base64!!"), Err(ApiError::Decode(_))));
    }

    #[test]
    fn test_attachment_disposition() {
        assert_eq!(
            attachment_disposition("vocals"),
            "attachment; filename=\"vocals.mp3\""
        );
    }
}
