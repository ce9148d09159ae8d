//! Chat Gateway - Main entry point
//!
//! Loads configuration, sets up logging and metrics, and serves the HTTP API.
//! On Unix, `SIGHUP` reloads the model catalog and provider settings.

use anyhow::Result;
use chat_gateway::{
    api::{build_router, AppState},
    core::{init_metrics, GatewayConfig},
};
use chrono::Local;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Custom time formatter that uses local timezone (respects TZ environment variable)
struct LocalTime;

impl tracing_subscriber::fmt::time::FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S"))
    }
}

fn init_tracing() {
    let no_color = std::env::var("NO_COLOR").is_ok();
    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // Noise suppression for HTTP libraries is always appended so a bare
    // RUST_LOG=trace does not flood the output.
    let base_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,chat_gateway=debug".to_string());
    let filter = tracing_subscriber::EnvFilter::new(format!(
        "{},hyper=warn,hyper::proto=warn,h2=warn,reqwest=warn",
        base_filter
    ));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_timer(LocalTime))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_timer(LocalTime)
                    .with_ansi(!no_color),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    init_tracing();
    init_metrics();

    let config = GatewayConfig::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    tracing::info!(
        default_model = %config.default_model,
        models = config.catalog.models.len(),
        glm_configured = config.providers.glm.has_credentials(),
        kimi_configured = config.providers.kimi.has_credentials(),
        wire_format = ?config.wire_format,
        "Configuration loaded"
    );

    let state = Arc::new(AppState::from_config(config)?);

    #[cfg(unix)]
    spawn_reload_listener(state.clone());

    let app = build_router(state);

    tracing::info!("Starting Chat Gateway on {}", addr);
    tracing::info!("Chat API: /api/chat/stream, /api/chat/models, /api/chat/health");
    tracing::info!("Metrics endpoint: /metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Reload configuration on SIGHUP. A failed reload keeps the current configuration.
#[cfg(unix)]
fn spawn_reload_listener(state: Arc<AppState>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGHUP handler, reload disabled");
                return;
            }
        };

        while hangup.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading configuration");
            match GatewayConfig::from_env() {
                Ok(config) => {
                    if let Err(e) = state.reload(config) {
                        tracing::error!(error = %e, "Failed to apply reloaded configuration");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to reload configuration, keeping current");
                }
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
