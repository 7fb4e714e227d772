//! Chat relay endpoint.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{ChatOutcome, record_chat};
use crate::relay::CompletionOptions;
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use huzi_core::{ChatReply, ChatRequest};
use serde_json::Value;

/// POST /api/chat
///
/// The body is read leniently: an empty body or a JSON value that is not an
/// object is an empty conversation. Only bodies that are not JSON at all are
/// rejected.
pub async fn chat(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ChatReply>> {
    let request = match parse_chat_request(&body) {
        Ok(request) => request,
        Err(e) => {
            record_chat(ChatOutcome::BadRequest);
            return Err(e);
        }
    };

    let options = CompletionOptions {
        system_prompt: request.system_prompt(),
        model: request.model(),
        temperature: request.temperature(),
    };

    match state.relay.complete(&request.messages, options).await {
        Ok(completion) => {
            record_chat(if completion.remote {
                ChatOutcome::Remote
            } else {
                ChatOutcome::Echo
            });
            Ok(Json(completion.reply))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Completion provider call failed");
            record_chat(ChatOutcome::UpstreamError);
            Err(e.into())
        }
    }
}

fn parse_chat_request(body: &[u8]) -> ApiResult<ChatRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ChatRequest::default());
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if !value.is_object() {
        return Ok(ChatRequest::default());
    }

    serde_json::from_value(value).map_err(|e| ApiError::BadRequest(e.to_string()))
}
