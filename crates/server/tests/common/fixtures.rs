//! Test fixtures and request helpers.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::Value;
use std::net::SocketAddr;
use tower::ServiceExt;

/// Size of the generated track. Spans several storage chunks.
#[allow(dead_code)]
pub const TEST_AUDIO_LEN: usize = 200_000;

/// Deterministic track bytes, so any slice can be checked by offset.
#[allow(dead_code)]
pub fn test_audio_data() -> Vec<u8> {
    (0..TEST_AUDIO_LEN).map(|i| (i % 251) as u8).collect()
}

/// Send a request through the router.
#[allow(dead_code)]
pub async fn send(router: &axum::Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

/// Collect a response body.
#[allow(dead_code)]
pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

/// GET /audio/stream with an optional Range header.
#[allow(dead_code)]
pub fn audio_request(range: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri("/audio/stream");
    if let Some(range) = range {
        builder = builder.header("Range", range);
    }
    builder.body(Body::empty()).unwrap()
}

/// POST /api/chat with a raw body, as if sent from `client`.
#[allow(dead_code)]
pub fn chat_request(body: impl Into<Body>, client: Option<SocketAddr>) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("Content-Type", "application/json")
        .body(body.into())
        .unwrap();
    if let Some(addr) = client {
        request
            .extensions_mut()
            .insert(axum::extract::ConnectInfo(addr));
    }
    request
}

/// POST a chat JSON body and decode the JSON reply.
#[allow(dead_code)]
pub async fn post_chat(
    router: &axum::Router,
    body: Value,
    client: Option<SocketAddr>,
) -> (StatusCode, Value) {
    let request = chat_request(serde_json::to_vec(&body).unwrap(), client);
    let response = send(router, request).await;
    let status = response.status();
    let bytes = body_bytes(response).await;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
