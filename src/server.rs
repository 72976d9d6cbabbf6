//! HTTP surface: still capture, MJPEG stream and status.
//!
//! - `GET /capture`: latest cached still
//! - `GET /stream`: `multipart/x-mixed-replace` live stream
//! - `GET /status`: cache and session summary

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::arbiter::CameraArbiter;
use crate::still::responder::{self, NO_STORE};
use crate::still::{LatestCapture, RefreshStats};
use crate::stream::{sink, SessionRegistry, StreamSession};

/// Shared state handed to every request
pub struct AppState {
    pub cache: Arc<LatestCapture>,
    pub arbiter: CameraArbiter,
    pub registry: Arc<SessionRegistry>,
    pub refresh: Arc<RefreshStats>,
    pub frame_pacing: Duration,
    pub channel_depth: usize,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/capture", get(capture))
        .route("/stream", get(stream))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Camera server listening on http://{}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// GET /capture
async fn capture(State(state): State<Arc<AppState>>) -> Response {
    responder::respond(&state.cache)
}

/// GET /stream
///
/// Spawns a session and answers once it has negotiated its content type.
async fn stream(State(state): State<Arc<AppState>>) -> Response {
    let Some(slot) = state.registry.try_admit() else {
        warn!(capacity = state.registry.capacity(), "Stream refused, all slots busy");
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many stream clients").into_response();
    };
    info!(session = slot.id(), "Stream session admitted");

    let (sink, source) = sink::channel(state.channel_depth);
    StreamSession::new(slot, state.arbiter.clone(), sink, state.frame_pacing).spawn();

    let Ok(content_type) = source.started.await else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Stream could not be started").into_response();
    };

    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, NO_STORE),
        ],
        Body::from_stream(source.body.into_stream()),
    )
        .into_response()
}

/// GET /status
async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let (succeeded, failed) = state.refresh.snapshot();

    let still = match state.cache.peek() {
        Some((bytes, captured_at)) => serde_json::json!({
            "available": bytes > 0,
            "bytes": bytes,
            "age_secs": SystemTime::now()
                .duration_since(captured_at)
                .map(|age| age.as_secs())
                .unwrap_or(0),
        }),
        None => serde_json::json!({ "available": false }),
    };

    Json(serde_json::json!({
        "still": still,
        "refresh": { "succeeded": succeeded, "failed": failed },
        "sessions": {
            "active": state.registry.active(),
            "capacity": state.registry.capacity(),
        },
    }))
}
