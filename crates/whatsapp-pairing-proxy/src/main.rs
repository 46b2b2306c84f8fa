//! WhatsApp Pairing Proxy - Entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use whatsapp_client::{BridgeClientFactory, Browser, ClientFactory};
use whatsapp_pairing_proxy::{
    api::{create_router_with_rate_limit, AppState, RateLimitState},
    config::Config,
    session::SessionManager,
};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.log.level);

    info!("Starting WhatsApp Pairing Proxy");

    let factory = match BridgeClientFactory::new(&config.bridge.api_url, config.bridge.timeout) {
        Ok(f) => f
            .with_poll_interval(config.bridge.poll_interval)
            .with_browser(Browser::windows(&config.bridge.browser)),
        Err(e) => {
            error!("Failed to create bridge client: {}", e);
            std::process::exit(1);
        }
    };

    if factory.health_check().await {
        info!("WhatsApp bridge healthy at {}", config.bridge.api_url);
    } else {
        error!(
            "WhatsApp bridge not reachable at {} - pairing requests will fail until it is",
            config.bridge.api_url
        );
    }

    info!("Credential directories under {:?}", config.sessions.root);

    let manager = SessionManager::new(Arc::new(factory), config.sessions.root.clone())
        .with_reconnect_policy(
            config.sessions.reconnect_backoff,
            config.sessions.max_reconnects,
        );
    let state = AppState::new(manager);
    let sessions = Arc::clone(&state.sessions);

    if config.rate_limit.per_ip_per_minute > 0 {
        info!(
            "Rate limiting {} requests per minute per client",
            config.rate_limit.per_ip_per_minute
        );
    }
    let rate_limit = RateLimitState::new(config.rate_limit.per_ip_per_minute);
    let app = create_router_with_rate_limit(state, rate_limit);

    let addr = match config.server.socket_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Server running on http://{}", addr);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    sessions.shutdown().await;
    info!("Shut down");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
