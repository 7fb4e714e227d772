//! Configuration types shared across crates.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port (the legacy `PORT` variable maps here).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served at `/` for the browser client.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Address string suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The pre-recorded audio track served at `/audio/stream`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Directory the track is resolved from.
    #[serde(default = "default_audio_root")]
    pub root: PathBuf,
    /// Track file name, relative to `root`.
    #[serde(default = "default_audio_file")]
    pub file: String,
    /// Content type override. Derived from the file extension when unset.
    #[serde(default)]
    pub content_type: Option<String>,
}

fn default_audio_root() -> PathBuf {
    PathBuf::from("public")
}

fn default_audio_file() -> String {
    "Andalusia.mp3".to_string()
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            root: default_audio_root(),
            file: default_audio_file(),
            content_type: None,
        }
    }
}

/// Remote completion provider (OpenAI-compatible chat completions).
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Bearer credential. When absent the relay runs in local echo mode.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Provider base URL, without the API path.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path appended to `base_url`.
    #[serde(default = "default_api_path")]
    pub api_path: String,
    /// Default model identifier.
    #[serde(default)]
    pub model: Option<String>,
    /// Default system preamble when the caller sends none.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Upper bound on a single completion call, in seconds.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    /// Sampling temperature when the caller sends none.
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_api_path() -> String {
    "/v1/chat/completions".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_temperature() -> f64 {
    0.7
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            api_path: default_api_path(),
            model: None,
            system_prompt: None,
            timeout_secs: default_provider_timeout_secs(),
            default_temperature: default_temperature(),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("api_path", &self.api_path)
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt)
            .field("timeout_secs", &self.timeout_secs)
            .field("default_temperature", &self.default_temperature)
            .finish()
    }
}

impl ProviderConfig {
    /// Full completion URL: base without trailing slash, path with a leading slash.
    pub fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.api_path.starts_with('/') {
            format!("{base}{}", self.api_path)
        } else {
            format!("{base}/{}", self.api_path)
        }
    }

    /// Credential, model and endpoint are all present.
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.api_key) && present(&self.model) && !self.base_url.trim().is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Chat rate limiting configuration (fixed window per client).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Requests admitted per client per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Lower bound of the simulated delay for blocked requests (inclusive).
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Upper bound of the simulated delay for blocked requests (exclusive).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Trusted proxy IP addresses/CIDR ranges.
    /// Only requests from these IPs will have X-Forwarded-For/X-Real-IP headers trusted.
    /// Use ["*"] to trust all proxies (NOT recommended for production).
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// Maximum number of client windows tracked before new clients are blocked.
    #[serde(default = "default_max_entries")]
    pub max_entries: u32,
    /// Interval in seconds between cleanup sweeps of idle windows.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_requests() -> u32 {
    20
}

fn default_min_delay_ms() -> u64 {
    1200
}

fn default_max_delay_ms() -> u64 {
    2000
}

fn default_max_entries() -> u32 {
    100_000
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            trusted_proxies: Vec::new(),
            max_entries: default_max_entries(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Validate for dangerous settings.
    /// Returns warnings for configs that are insecure but allowed,
    /// and an error for configs that cannot work.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        if !self.enabled {
            return Ok(warnings);
        }

        if self.window_secs == 0 {
            return Err(Error::InvalidConfig(
                "rate_limit.window_secs must be at least 1".to_string(),
            ));
        }

        if self.max_requests == 0 {
            return Err(Error::InvalidConfig(
                "rate_limit.max_requests must be at least 1 (disable the limiter instead)"
                    .to_string(),
            ));
        }

        if self.min_delay_ms >= self.max_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "rate_limit.min_delay_ms ({}) must be below max_delay_ms ({})",
                self.min_delay_ms, self.max_delay_ms
            )));
        }

        // tokio::time::interval panics on a zero period
        if self.cleanup_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "rate_limit.cleanup_interval_secs cannot be 0".to_string(),
            ));
        }

        if self.trusted_proxies.len() == 1 && self.trusted_proxies[0] == "*" {
            warnings.push(
                "rate_limit.trusted_proxies=['*'] trusts ALL forwarded headers. \
                 Clients can spoof their address and bypass the chat limit."
                    .to_string(),
            );
        }

        Ok(warnings)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Configuration for tests: echo mode, rate limiting off, metrics off.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                metrics_enabled: false,
                ..Default::default()
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate the whole configuration, returning accumulated warnings.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut warnings = self.rate_limit.validate()?;

        if self.provider.timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "provider.timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.provider.api_key.is_some() && !self.provider.is_configured() {
            warnings.push(
                "provider.api_key is set but provider.model is empty; \
                 chat replies will use local echo mode"
                    .to_string(),
            );
        }

        Ok(warnings)
    }
}
