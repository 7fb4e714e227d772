//! Liveness probe.

use axum::Json;
use axum::response::IntoResponse;
use serde_json::json;

/// GET /health - always `{"ok": true}` while the process serves requests.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}
