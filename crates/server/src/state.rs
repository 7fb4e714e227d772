//! Application state shared across handlers.

use crate::ratelimit::RateLimitState;
use crate::relay::CompletionRelay;
use huzi_core::config::AppConfig;
use huzi_storage::{FilesystemBackend, ResourceStore};
use std::sync::Arc;
use std::time::Duration;

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Config(#[from] huzi_core::Error),

    #[error("failed to initialise completion relay: {0}")]
    Relay(#[from] crate::relay::RelayError),
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Store the audio track is read from.
    pub store: Arc<dyn ResourceStore>,
    /// Chat rate gate.
    pub rate_limit: RateLimitState,
    /// Completion relay, mode fixed at construction.
    pub relay: CompletionRelay,
}

impl AppState {
    /// Build state from configuration, serving audio from `config.audio.root`.
    pub fn from_config(config: AppConfig) -> Result<Self, StateError> {
        let store: Arc<dyn ResourceStore> = Arc::new(FilesystemBackend::new(&config.audio.root));
        let relay = CompletionRelay::from_config(&config.provider)?;
        Self::new(config, store, relay)
    }

    /// Build state from explicit parts.
    ///
    /// Validates the configuration, logging warnings and rejecting settings
    /// that cannot work.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ResourceStore>,
        relay: CompletionRelay,
    ) -> Result<Self, StateError> {
        for warning in config.validate()? {
            tracing::warn!("Configuration warning: {}", warning);
        }

        let rate_limit = RateLimitState::new(&config.rate_limit);

        Ok(Self {
            config: Arc::new(config),
            store,
            rate_limit,
            relay,
        })
    }

    /// Get the cleanup interval for the rate gate, if enabled.
    pub fn rate_limit_cleanup_interval(&self) -> Option<Duration> {
        self.rate_limit.cleanup_interval()
    }

    /// Storage key of the audio track.
    pub fn audio_key(&self) -> &str {
        &self.config.audio.file
    }
}
