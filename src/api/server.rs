use std::future::Future;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    services::{dead_letters, get_track, health, list_queue, remove_track, separate},
    state::AppState,
};

/// All HTTP routes over the given state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/apiv1/separate", post(separate))
        .route("/apiv1/queue", get(list_queue))
        .route("/apiv1/track/{hash}/{track}", get(get_track))
        .route("/apiv1/remove/{hash}/{track}", delete(remove_track))
        .route("/apiv1/dead-letters", get(dead_letters))
        .route("/health", get(health))
        .with_state(state)
        // Submissions are size-checked by the handler against server.max_payload_bytes
        .layer(DefaultBodyLimit::disable())
        // Automatically decompress gzip request bodies
        .layer(RequestDecompressionLayer::new())
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = listener.local_addr()?;
    info!(%address, "stemsplit API listening");

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}
