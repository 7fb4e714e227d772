//! HTTP server for the huzi chat relay.
//!
//! This crate provides:
//! - Byte-range streaming of the audio track
//! - The chat relay endpoint behind a fixed-window rate gate
//! - Health, metrics and static file routes

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod partial;
pub mod ratelimit;
pub mod relay;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use ratelimit::RateLimitState;
pub use relay::{CompletionRelay, ProviderMode};
pub use routes::create_router;
pub use state::AppState;
