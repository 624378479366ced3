use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod api;
mod auth;
mod backend;
mod config;
mod error;

use api::routes::{create_router, AppState};
use auth::TokenService;
use backend::Forwarder;
use config::GatewayConfig;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Configuration from environment; a missing secret is fatal here, not at
    // request time.
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid address");

    tracing::info!("TTS Gateway v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Authentication required: {}", config.require_auth);
    for (engine, route) in &config.routes {
        tracing::info!("Engine '{}' -> {}", engine.name(), route.base_url);
    }
    if config.routes.is_empty() {
        tracing::warn!("No backend endpoints configured; synthesis requests will be rejected");
    }

    let tokens = TokenService::new(config.jwt_secret.as_bytes(), config.token_ttl);
    let forwarder = match Forwarder::new(config.routes.clone(), config.retry_policy()) {
        Ok(forwarder) => forwarder,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState {
        config,
        tokens,
        forwarder,
    });

    let app = create_router(state);

    tracing::info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app).await.expect("Server error");
}
