//! Serves the cached still. Never touches the camera.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::error::CaptureError;
use crate::still::cache::{CachedStill, LatestCapture};

pub(crate) const NO_STORE: &str = "no-store, no-cache, must-revalidate, max-age=0";

pub fn respond(cache: &LatestCapture) -> Response {
    render(cache.read())
}

/// Response for one read of the still cache
pub fn render(read: Result<Option<CachedStill>, CaptureError>) -> Response {
    match read {
        Ok(Some(still)) if !still.is_empty() => {
            debug!(bytes = still.len(), "Serving cached still");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg")),
                    (header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE)),
                    (header::PRAGMA, HeaderValue::from_static("no-cache")),
                    (header::EXPIRES, HeaderValue::from_static("0")),
                    (
                        header::CONTENT_DISPOSITION,
                        HeaderValue::from_static("inline; filename=capture.jpg"),
                    ),
                ],
                still.bytes,
            )
                .into_response()
        }
        Ok(_) => unavailable("No still has been captured yet"),
        Err(e @ CaptureError::Allocation { .. }) => {
            warn!(error = %e, "Could not copy cached still");
            unavailable("Still buffer temporarily unavailable")
        }
        Err(e) => {
            warn!(error = %e, "Cached still unreadable");
            unavailable("Still temporarily unavailable")
        }
    }
}

fn unavailable(reason: &'static str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8")),
            (header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE)),
        ],
        reason,
    )
        .into_response()
}
