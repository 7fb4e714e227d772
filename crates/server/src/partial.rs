//! Partial content responder.
//!
//! Turns a resource plus an optional `Range` header into a 200, 206 or 416
//! response. Bodies are streamed from the store in bounded chunks; the
//! resource is never buffered whole.

use crate::error::{ApiError, ApiResult};
use crate::metrics::AUDIO_BYTES_STREAMED;
use axum::body::Body;
use axum::http::StatusCode;
use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use huzi_core::{RangeDecision, parse_range};
use huzi_storage::{ByteStream, ResourceStore};

/// Serve `key` from `store`, honouring `range_header`.
///
/// `content_type` overrides the type the store reports.
pub async fn respond(
    store: &dyn ResourceStore,
    key: &str,
    content_type: Option<&str>,
    range_header: Option<&str>,
) -> ApiResult<Response> {
    let resource = store.open(key).await?;
    let total = resource.meta.size;
    let content_type = content_type
        .map(str::to_string)
        .or_else(|| resource.meta.content_type.clone())
        .unwrap_or_else(|| huzi_storage::content_type::DEFAULT_CONTENT_TYPE.to_string());

    match parse_range(range_header, total) {
        RangeDecision::Unsatisfiable => {
            tracing::debug!(key, range = ?range_header, total, "Unsatisfiable range");
            Err(ApiError::RangeNotSatisfiable { total })
        }
        RangeDecision::FullContent => Ok((
            StatusCode::OK,
            [
                (CONTENT_TYPE, content_type),
                (CONTENT_LENGTH, total.to_string()),
                (ACCEPT_RANGES, "bytes".to_string()),
            ],
            streaming_body(resource.stream(), key),
        )
            .into_response()),
        RangeDecision::PartialContent(range) => {
            tracing::debug!(key, start = range.start, end = range.end, total, "Serving byte range");
            let stream = resource.stream_range(range)?;
            Ok((
                StatusCode::PARTIAL_CONTENT,
                [
                    (CONTENT_RANGE, range.content_range(total)),
                    (ACCEPT_RANGES, "bytes".to_string()),
                    (CONTENT_LENGTH, range.len().to_string()),
                    (CONTENT_TYPE, content_type),
                ],
                streaming_body(stream, key),
            )
                .into_response())
        }
    }
}

/// Wrap a storage stream as a response body.
///
/// Headers are already on the wire when a chunk fails, so the failure is
/// logged and surfaced as a body error, which aborts the connection.
fn streaming_body(stream: ByteStream, key: &str) -> Body {
    let key = key.to_string();
    let stream = stream.map(move |result| match result {
        Ok(bytes) => {
            AUDIO_BYTES_STREAMED.inc_by(bytes.len() as u64);
            Ok(bytes)
        }
        Err(e) => {
            tracing::error!(key = %key, error = %e, "Audio streaming failed mid-transfer");
            Err(std::io::Error::other(e.to_string()))
        }
    });
    Body::from_stream(stream)
}
