//! Audio track streaming.

use crate::error::ApiResult;
use crate::metrics::record_audio_status;
use crate::partial;
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::RANGE;
use axum::response::{IntoResponse, Response};

/// GET /audio/stream - the configured track, with byte-range support.
pub async fn stream_audio(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let result = serve_track(&state, &headers).await;
    let response = match result {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };
    record_audio_status(response.status());
    response
}

async fn serve_track(state: &AppState, headers: &HeaderMap) -> ApiResult<Response> {
    // A Range header that is not valid UTF-8 is treated as absent.
    let range = headers.get(RANGE).and_then(|v| v.to_str().ok());
    partial::respond(
        state.store.as_ref(),
        state.audio_key(),
        state.config.audio.content_type.as_deref(),
        range,
    )
    .await
}
