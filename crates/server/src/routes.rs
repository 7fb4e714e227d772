//! Route configuration.

use crate::error::ApiError;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::ratelimit::chat_rate_limit_middleware;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Only the chat relay sits behind the rate gate.
    let chat_routes = Router::new()
        .route("/api/chat", post(handlers::chat))
        .layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            chat_rate_limit_middleware,
        ));

    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/audio/stream", get(handlers::stream_audio))
        .merge(chat_routes);

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    let static_files = ServeDir::new(&state.config.server.static_dir);

    // Order of execution: TraceLayer -> CORS -> CatchPanic -> (rate gate) -> handler
    router
        .fallback_service(static_files)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Render a handler panic as a generic assistant-styled 500.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");

    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}
