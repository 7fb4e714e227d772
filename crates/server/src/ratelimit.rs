//! Fixed-window rate gate for the chat endpoint.
//!
//! Each client key gets a window of `window_secs` in which at most
//! `max_requests` chat calls are admitted. Blocked calls are never rejected
//! with an error status: the gate waits a random delay and answers with an
//! assistant-styled "nap" reply, so the browser client renders it like any
//! other message.
//!
//! # Memory Safety
//!
//! - Configurable maximum entries (default: 100,000); new keys beyond it are blocked
//! - Background cleanup task evicts windows that have already elapsed
//!
//! # Security Note
//!
//! By default, X-Forwarded-For and X-Real-IP headers are NOT trusted to prevent
//! IP spoofing. Configure `trusted_proxies` to enable header-based IP detection:
//!
//! - Empty list (default): Only direct connection IP is used (most secure)
//! - List of IPs/CIDRs: Headers trusted only when request comes from these IPs
//! - ["*"]: Trust headers from all sources (NOT recommended for production)

use crate::metrics::{ChatOutcome, record_chat};
use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::{DashMap, mapref::entry::Entry};
use huzi_core::config::RateLimitConfig;
use huzi_core::{ChatReply, ReplyMeta};
use ipnet::IpNet;
use rand::Rng;
use std::{
    net::{IpAddr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

/// Content of the disguised reply sent to blocked clients.
pub const NAP_REPLY: &str = "(taking a short nap... please try again in a moment)";

/// Rate limiter state shared across requests.
#[derive(Clone)]
pub struct RateLimitState {
    inner: Option<Arc<RateLimitStateInner>>,
}

/// Inner state that's only allocated when rate limiting is enabled.
struct RateLimitStateInner {
    /// Client key -> current window.
    windows: DashMap<String, RateWindow>,
    window: Duration,
    max_requests: u32,
    min_delay_ms: u64,
    max_delay_ms: u64,
    trusted_proxies: TrustedProxies,
    /// Maximum tracked keys before new keys are blocked.
    max_entries: u32,
    cleanup_interval: Duration,
    /// Whether ConnectInfo missing warning has been logged.
    connect_info_warned: AtomicBool,
    /// Whether the at-capacity warning has been logged for the current capacity event.
    at_capacity_warned: AtomicBool,
}

#[derive(Clone, Copy, Debug)]
struct RateWindow {
    started: Instant,
    count: u32,
}

/// Outcome of asking the gate to admit one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Forward the request. `remaining` is what is left in the current window.
    Allowed { remaining: u32 },
    /// Answer with the disguised reply instead.
    Blocked(BlockReason),
}

/// Reason for a blocked admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// The key used up its window.
    RateLimited,
    /// The gate is tracking `max_entries` keys and cannot take another.
    AtCapacity,
}

/// A parsed trusted proxy entry (either an IP or CIDR range).
#[derive(Clone, Debug)]
enum TrustedEntry {
    Ip(IpAddr),
    Cidr(IpNet),
}

/// Trusted proxy configuration for IP extraction.
#[derive(Clone, Debug)]
enum TrustedProxies {
    /// Never trust forwarded headers (default, most secure).
    None,
    /// Trust headers from all sources (dangerous, for development only).
    All,
    /// Trust headers only from specific IPs/CIDRs.
    List(Vec<TrustedEntry>),
}

impl TrustedProxies {
    fn from_config(proxies: &[String]) -> Self {
        if proxies.is_empty() {
            return Self::None;
        }
        if proxies.len() == 1 && proxies[0] == "*" {
            return Self::All;
        }

        let entries = proxies
            .iter()
            .filter_map(|p| {
                let parsed = if p.contains('/') {
                    p.parse::<IpNet>()
                        .map(TrustedEntry::Cidr)
                        .map_err(|e| e.to_string())
                } else {
                    p.parse::<IpAddr>()
                        .map(TrustedEntry::Ip)
                        .map_err(|e| e.to_string())
                };
                parsed
                    .inspect_err(|e| {
                        tracing::warn!(entry = %p, error = %e, "Ignoring invalid trusted_proxies entry");
                    })
                    .ok()
            })
            .collect();
        Self::List(entries)
    }

    /// Check if the given connection IP is a trusted proxy.
    fn is_trusted(&self, connection_ip: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::List(entries) => {
                let Ok(ip) = connection_ip.parse::<IpAddr>() else {
                    return false;
                };
                entries.iter().any(|entry| match entry {
                    TrustedEntry::Ip(trusted) => *trusted == ip,
                    TrustedEntry::Cidr(network) => network.contains(&ip),
                })
            }
        }
    }
}

impl RateLimitState {
    /// Create a new rate limit state from configuration.
    pub fn new(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self { inner: None };
        }

        Self {
            inner: Some(Arc::new(RateLimitStateInner {
                windows: DashMap::new(),
                window: config.window(),
                max_requests: config.max_requests,
                min_delay_ms: config.min_delay_ms,
                max_delay_ms: config.max_delay_ms,
                trusted_proxies: TrustedProxies::from_config(&config.trusted_proxies),
                max_entries: config.max_entries,
                cleanup_interval: config.cleanup_interval(),
                connect_info_warned: AtomicBool::new(false),
                at_capacity_warned: AtomicBool::new(false),
            })),
        }
    }

    /// Admit one request for `key` now.
    pub fn admit(&self, key: &str) -> Admission {
        self.admit_at(key, Instant::now())
    }

    /// Admit one request for `key` at instant `now`.
    pub fn admit_at(&self, key: &str, now: Instant) -> Admission {
        let Some(inner) = &self.inner else {
            return Admission::Allowed {
                remaining: u32::MAX,
            };
        };

        // len() before entry(): DashMap can deadlock if len() runs while an entry lock is held.
        let current_len = inner.windows.len();
        let at_capacity = current_len >= inner.max_entries as usize;

        match inner.windows.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let window = entry.get_mut();
                if now.saturating_duration_since(window.started) >= inner.window {
                    window.started = now;
                    window.count = 0;
                }
                if window.count >= inner.max_requests {
                    return Admission::Blocked(BlockReason::RateLimited);
                }
                window.count += 1;
                Admission::Allowed {
                    remaining: inner.max_requests - window.count,
                }
            }
            Entry::Vacant(entry) => {
                if at_capacity {
                    if !inner.at_capacity_warned.swap(true, Ordering::Relaxed) {
                        tracing::warn!(
                            current_entries = current_len,
                            max_entries = inner.max_entries,
                            "Rate limiter at capacity, blocking new clients. \
                             Logged once per capacity event."
                        );
                    }
                    return Admission::Blocked(BlockReason::AtCapacity);
                }
                entry.insert(RateWindow {
                    started: now,
                    count: 1,
                });
                Admission::Allowed {
                    remaining: inner.max_requests.saturating_sub(1),
                }
            }
        }
    }

    /// Check if rate limiting is enabled.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Cleanup interval, or `None` when the gate is disabled.
    pub fn cleanup_interval(&self) -> Option<Duration> {
        self.inner.as_ref().map(|inner| inner.cleanup_interval)
    }

    /// Number of tracked client windows.
    pub fn entry_count(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.windows.len())
    }

    /// Evict windows that have elapsed. Returns the number evicted.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    /// Evict windows that have elapsed as of `now`.
    ///
    /// An elapsed window is equivalent to no window, so eviction never changes
    /// an admission decision. `remove_if` re-checks under the shard lock so a
    /// window refreshed since the scan is kept.
    pub fn cleanup_at(&self, now: Instant) -> usize {
        let Some(inner) = &self.inner else {
            return 0;
        };

        let expired = |w: &RateWindow| now.saturating_duration_since(w.started) >= inner.window;

        let candidates: Vec<String> = inner
            .windows
            .iter()
            .filter(|entry| expired(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        let evicted = candidates
            .into_iter()
            .filter(|key| inner.windows.remove_if(key, |_, w| expired(w)).is_some())
            .count();

        if evicted > 0 {
            inner.at_capacity_warned.store(false, Ordering::Relaxed);
            tracing::debug!(
                evicted,
                remaining = inner.windows.len(),
                "Rate limiter cleanup completed"
            );
        }

        evicted
    }

    /// Pick the simulated delay for a blocked reply.
    pub fn simulated_delay(&self) -> Duration {
        let Some(inner) = &self.inner else {
            return Duration::ZERO;
        };
        let ms = if inner.min_delay_ms < inner.max_delay_ms {
            rand::rng().random_range(inner.min_delay_ms..inner.max_delay_ms)
        } else {
            inner.min_delay_ms
        };
        Duration::from_millis(ms)
    }

    /// Log a warning if ConnectInfo is not available (only once).
    fn warn_connect_info_missing(&self) {
        if let Some(inner) = &self.inner
            && !inner.connect_info_warned.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                "ConnectInfo not available for rate limiting. All chat requests will share \
                 the 'unknown' window. Serve with into_make_service_with_connect_info::<SocketAddr>() \
                 to limit per client."
            );
        }
    }
}

/// Client IP from forwarding headers. Only consulted for trusted proxies.
fn extract_forwarded_ip(req: &Request<Body>) -> Option<String> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    // First hop of X-Forwarded-For is the original client.
    if let Some(forwarded) = header("x-forwarded-for")
        && let Some(ip) = forwarded.split(',').next().map(str::trim)
        && !ip.is_empty()
    {
        return Some(ip.to_string());
    }

    header("x-real-ip")
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

/// Extract connection IP from request extensions (set by ConnectInfo).
fn extract_connection_ip(req: &Request<Body>) -> Option<String> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

/// Client key for the gate.
///
/// Forwarding headers are read only when the connection comes from a trusted
/// proxy, or when every proxy is trusted.
fn client_key(req: &Request<Body>, state: &RateLimitState) -> String {
    let Some(inner) = &state.inner else {
        return "unknown".to_string();
    };

    let connection_ip = extract_connection_ip(req);

    let trust_headers = match (&connection_ip, &inner.trusted_proxies) {
        (None, TrustedProxies::All) => true,
        // Can't verify a listed proxy without a connection IP.
        (None, _) => false,
        (Some(conn_ip), trusted_proxies) => trusted_proxies.is_trusted(conn_ip),
    };

    if trust_headers && let Some(forwarded_ip) = extract_forwarded_ip(req) {
        return forwarded_ip;
    }

    connection_ip.unwrap_or_else(|| {
        state.warn_connect_info_missing();
        "unknown".to_string()
    })
}

/// Rate gate middleware for `POST /api/chat`.
///
/// Admitted requests go to the handler untouched. Blocked requests are held
/// for a random delay and answered with a 200 assistant reply carrying
/// `meta.simulatedSleepMs`.
pub async fn chat_rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !rate_limit.is_enabled() {
        return next.run(req).await;
    }

    let key = client_key(&req, &rate_limit);

    match rate_limit.admit(&key) {
        Admission::Allowed { remaining } => {
            tracing::trace!(client = %key, remaining, "Chat request admitted");
            next.run(req).await
        }
        Admission::Blocked(reason) => {
            let delay = rate_limit.simulated_delay();
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            tracing::info!(
                client = %key,
                reason = ?reason,
                delay_ms,
                "Chat request rate limited, sending nap reply"
            );
            record_chat(ChatOutcome::RateLimited);

            tokio::time::sleep(delay).await;

            let reply = ChatReply::assistant(NAP_REPLY).with_meta(ReplyMeta {
                simulated_sleep_ms: delay_ms,
            });
            Json(reply).into_response()
        }
    }
}

/// Spawn a background task that periodically evicts elapsed windows.
pub fn spawn_cleanup_task(
    state: RateLimitState,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let evicted = state.cleanup();
            if evicted > 0 {
                tracing::info!(evicted, "Rate limiter cleanup task evicted elapsed windows");
            }
        }
    })
}
