//! huzi server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use huzi_core::config::AppConfig;
use huzi_server::{AppState, ProviderMode, create_router};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// huzi - chat relay and audio streaming backend
#[derive(Parser, Debug)]
#[command(name = "huzid")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "HUZI_CONFIG", default_value = "config/server.toml")]
    config: String,
}

/// Flat environment variables kept from earlier deployments.
const LEGACY_ENV_VARS: [&str; 6] = [
    "PORT",
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "OPENAI_API_PATH",
    "OPENAI_MODEL",
    "SYSTEM_PROMPT",
];

/// Nested config key for a legacy variable name.
fn legacy_key(name: &str) -> Option<&'static str> {
    match name.to_ascii_uppercase().as_str() {
        "PORT" => Some("server.port"),
        "OPENAI_API_KEY" => Some("provider.api_key"),
        "OPENAI_BASE_URL" => Some("provider.base_url"),
        "OPENAI_API_PATH" => Some("provider.api_path"),
        "OPENAI_MODEL" => Some("provider.model"),
        "SYSTEM_PROMPT" => Some("provider.system_prompt"),
        _ => None,
    }
}

/// Layer the configuration sources: file, then `HUZI_*`, then legacy variables.
fn figment(config_path: &str) -> Figment {
    let legacy = LEGACY_ENV_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok().map(|value| (*name, value)));
    layered(config_path, legacy)
}

/// Build the layered configuration with the legacy variables given as pairs.
///
/// Legacy values are plain strings and are never parsed as TOML-like values,
/// so a key such as `123456` or a prompt such as `[be kind]` stays a string.
/// Blank values count as unset.
fn layered<'a>(
    config_path: &str,
    legacy: impl IntoIterator<Item = (&'a str, String)>,
) -> Figment {
    let mut figment = Figment::new();

    if std::path::Path::new(config_path).exists() {
        tracing::info!(config_path = %config_path, "Loading configuration from file");
        figment = figment.merge(Toml::file(config_path));
    } else {
        tracing::debug!("No config file found at {}", config_path);
    }

    figment = figment.merge(Env::prefixed("HUZI_").ignore(&["CONFIG"]).split("__"));

    for (name, value) in legacy {
        let Some(key) = legacy_key(name) else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        figment = match (key, value.parse::<u16>()) {
            ("server.port", Ok(port)) => figment.merge(Serialized::default(key, port)),
            _ => figment.merge(Serialized::default(key, value.to_string())),
        };
    }

    figment
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("huzi v{}", env!("CARGO_PKG_VERSION"));

    let config: AppConfig = figment(&args.config)
        .extract()
        .context("failed to load configuration")?;

    huzi_server::metrics::register_metrics();
    if config.server.metrics_enabled {
        tracing::info!("Prometheus metrics exposed at /metrics");
    }

    let bind_addr = config.server.bind_addr();
    let state = AppState::from_config(config).context("invalid configuration")?;

    match state.relay.mode() {
        ProviderMode::Remote { model, .. } => tracing::info!(
            endpoint = %state.config.provider.endpoint(),
            model = %model,
            "Completion relay in remote mode"
        ),
        ProviderMode::Echo => tracing::warn!(
            "OPENAI_API_KEY or OPENAI_MODEL not set, chat replies use local echo mode"
        ),
    }

    if let Err(e) = state.store.health_check().await {
        tracing::warn!(
            root = %state.config.audio.root.display(),
            error = %e,
            "Audio directory is not readable, /audio/stream will answer 404"
        );
    }

    if let Some(cleanup_interval) = state.rate_limit_cleanup_interval() {
        huzi_server::ratelimit::spawn_cleanup_task(state.rate_limit.clone(), cleanup_interval);
        tracing::info!(
            interval_secs = cleanup_interval.as_secs(),
            "Rate limiter cleanup task spawned"
        );
    }

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    // ConnectInfo supplies the client IP used as the rate gate key.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
