//! Prometheus metrics for the huzi server.
//!
//! Exposes chat outcomes, audio delivery and upstream completion latency.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no message content or client addresses, only aggregate counts.
//! Restrict the endpoint to scraper IPs at the infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Chat metrics
pub static CHAT_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "huzi_chat_requests_total",
            "Total chat requests by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static UPSTREAM_COMPLETION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "huzi_upstream_completion_duration_seconds",
            "Time taken by the remote completion provider",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0]),
    )
    .expect("metric creation failed")
});

// Audio metrics
pub static AUDIO_RESPONSES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "huzi_audio_responses_total",
            "Total audio stream responses by HTTP status",
        ),
        &["status"],
    )
    .expect("metric creation failed")
});

pub static AUDIO_BYTES_STREAMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "huzi_audio_bytes_streamed_total",
        "Total audio bytes handed to clients",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build many routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(CHAT_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPSTREAM_COMPLETION_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(AUDIO_RESPONSES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(AUDIO_BYTES_STREAMED.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Chat request outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatOutcome {
    Remote,
    Echo,
    RateLimited,
    UpstreamError,
    BadRequest,
}

impl ChatOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Echo => "echo",
            Self::RateLimited => "rate_limited",
            Self::UpstreamError => "upstream_error",
            Self::BadRequest => "bad_request",
        }
    }
}

/// Helper to record a chat request outcome.
pub fn record_chat(outcome: ChatOutcome) {
    CHAT_REQUESTS.with_label_values(&[outcome.as_str()]).inc();
}

/// Helper to record an audio response status.
pub fn record_audio_status(status: StatusCode) {
    AUDIO_RESPONSES
        .with_label_values(&[status.as_str()])
        .inc();
}
