use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::{
    models::{
        DeadLettersQuery, DeadLettersResponse, ENQUEUED_REASON, HealthResponse, QueueResponse,
        SeparateRequest, SeparateResponse,
    },
    state::AppState,
    utils::{attachment_disposition, decode_audio, parse_content_type, read_body},
    validation::validate_separate_request,
};
use crate::addressing::{ContentHash, ORIGINAL_TRACK, blob_key, content_hash, validate_track_name};
use crate::api::error::ApiError;
use crate::proto::QueueEntry;
use crate::storage::{AUDIO_CONTENT_TYPE, StorageError};

const DEFAULT_DEAD_LETTER_LIMIT: usize = 100;
const MAX_DEAD_LETTER_LIMIT: usize = 1000;

/// Song submission endpoint (POST /apiv1/separate)
///
/// ## Flow:
/// 1. Validate Content-Type and body size (gzip bodies are inflated first)
/// 2. Deserialize the request and validate the callback URL
/// 3. Base64-decode `mp3` ignoring line breaks; failure is a 400 `DECODE_ERROR`
/// 4. Hash the base64 text; the hash addresses every track of the song
/// 5. Store the decoded bytes as `{hash}/original.mp3`
/// 6. Enqueue `{hash, callback}` for a worker
///
/// Success is only reported once steps 5 and 6 both succeeded. Submitting the
/// same song twice enqueues two entries with the same hash.
pub async fn separate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    parse_content_type(content_type)?;

    let max_size = state.config.server.max_payload_bytes.as_usize();
    let body_bytes = read_body(body, max_size).await?;

    let request: SeparateRequest = serde_json::from_slice(&body_bytes)?;
    let callback_url = validate_separate_request(&request)
        .map_err(|e| ApiError::InvalidPayload(e.to_string()))?;

    let audio = decode_audio(&request.mp3)?;

    let hash = content_hash(&request.mp3);
    info!(
        %hash,
        song_name = request.song_name.as_deref().unwrap_or_default(),
        size = audio.len(),
        has_callback = callback_url.is_some(),
        "Song received"
    );

    state
        .storage
        .ensure_container()
        .await
        .map_err(|e| ApiError::StorageUnavailable(e.to_string()))?;

    state
        .storage
        .put(&blob_key(&hash, ORIGINAL_TRACK), audio, AUDIO_CONTENT_TYPE)
        .await
        .map_err(|e| ApiError::StorageUnavailable(e.to_string()))?;

    let entry = QueueEntry::new(hash.clone(), callback_url);
    state
        .queue
        .enqueue(&entry)
        .await
        .map_err(|e| ApiError::QueueUnavailable(e.to_string()))?;

    state.metrics.job_submitted();
    info!(%hash, "Song enqueued");

    Ok(Json(SeparateResponse {
        hash: hash.into_string(),
        reason: ENQUEUED_REASON.to_string(),
    }))
}

/// Pending jobs, next to be processed first (GET /apiv1/queue)
pub async fn list_queue(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let entries = state
        .queue
        .peek_all()
        .await
        .map_err(|e| ApiError::QueueUnavailable(e.to_string()))?;

    let queue = entries.into_iter().map(|entry| entry.content_hash).collect();

    Ok(Json(QueueResponse { queue }))
}

/// Download one track of a song (GET /apiv1/track/{hash}/{track})
pub async fn get_track(
    State(state): State<AppState>,
    Path((hash, track)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let hash = ContentHash::parse(&hash)?;
    validate_track_name(&track)?;

    let key = blob_key(&hash, &track);
    let data = state.storage.get(&key).await.map_err(|e| match e {
        StorageError::NotFound(_) => ApiError::NotFound(key.clone()),
        other => ApiError::StorageUnavailable(other.to_string()),
    })?;

    debug!(%hash, track, size = data.len(), "Serving track");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, AUDIO_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, attachment_disposition(&track)),
        ],
        data,
    ))
}

/// Delete one track of a song (DELETE /apiv1/remove/{hash}/{track})
///
/// Deleting a track that does not exist succeeds, so the call can be repeated.
pub async fn remove_track(
    State(state): State<AppState>,
    Path((hash, track)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let hash = ContentHash::parse(&hash)?;
    validate_track_name(&track)?;

    state
        .storage
        .delete(&blob_key(&hash, &track))
        .await
        .map_err(|e| ApiError::StorageUnavailable(e.to_string()))?;

    info!(%hash, track, "Track removed");
    Ok(StatusCode::NO_CONTENT)
}

/// Jobs that failed terminally, oldest first (GET /apiv1/dead-letters?limit=N)
pub async fn dead_letters(
    State(state): State<AppState>,
    Query(query): Query<DeadLettersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_DEAD_LETTER_LIMIT)
        .min(MAX_DEAD_LETTER_LIMIT);

    let dead_letters = state
        .queue
        .dead_letters(limit)
        .await
        .map_err(|e| ApiError::QueueUnavailable(e.to_string()))?;

    Ok(Json(DeadLettersResponse { dead_letters }))
}

/// Health check endpoint (GET /health)
///
/// Checks the queue and the storage container. Returns 503 Service
/// Unavailable if either is unhealthy, 200 OK otherwise.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = BTreeMap::new();
    components.insert("api".to_string(), "healthy".to_string());

    let queue_status = match state.queue.health().await {
        Ok(()) => "healthy",
        Err(e) => {
            warn!(error = %e, "Queue health check failed");
            "unhealthy"
        }
    };
    components.insert("queue".to_string(), queue_status.to_string());

    let storage_status = match state.storage.health().await {
        Ok(()) => "healthy",
        Err(e) => {
            warn!(error = %e, "Storage health check failed");
            "unhealthy"
        }
    };
    components.insert("storage".to_string(), storage_status.to_string());

    let all_healthy = components.values().all(|status| status == "healthy");
    let (status_code, overall_status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}
