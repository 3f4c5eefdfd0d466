// src/main.rs
// Entry point for the a2a call lifecycle server.

use std::net::SocketAddr;

use a2a_runtime::config::server::PORT_FALLBACKS;
use a2a_runtime::{AppState, CONFIG};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&CONFIG.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(config_dir = %CONFIG.config_dir.display(), "starting a2a runtime");

    let state = AppState::new().await?;
    let app = a2a_runtime::api::http::create_router(state);

    let listener = bind_listener().await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

/// Binds the configured port, or the first available port from
/// `PORT_FALLBACKS` when none was set via `PORT` / argv[1].
async fn bind_listener() -> anyhow::Result<TcpListener> {
    let host = &CONFIG.server.host;

    if let Some(port) = CONFIG.server.port {
        return Ok(TcpListener::bind(format!("{host}:{port}")).await?);
    }

    for port in PORT_FALLBACKS {
        match TcpListener::bind(format!("{host}:{port}")).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                tracing::warn!(port, error = %e, "port unavailable, trying next fallback");
            }
        }
    }

    anyhow::bail!("no fallback port in {:?} was available", PORT_FALLBACKS)
}
