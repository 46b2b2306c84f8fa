//! HTTP API for the pairing proxy.

mod handlers;
mod middleware;
mod types;

pub use handlers::*;
pub use middleware::{logging_middleware, rate_limit_middleware, RateLimitState};
pub use types::*;

use crate::session::SessionManager;
use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Session lifecycle manager
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    /// Create new application state.
    pub fn new(sessions: SessionManager) -> Self {
        Self {
            sessions: Arc::new(sessions),
        }
    }
}

/// Create the API router without rate limiting.
pub fn create_router(state: AppState) -> Router {
    create_router_with_rate_limit(state, RateLimitState::disabled())
}

/// Create the API router with a per-client rate limit.
///
/// Limiting needs the peer address, so serve the router with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_router_with_rate_limit(state: AppState, rate_limit: RateLimitState) -> Router {
    let api = Router::new()
        .route("/api/paircode", get(handlers::pair_code))
        .route("/api/status", get(handlers::session_status))
        .layer(axum_middleware::from_fn_with_state(
            rate_limit,
            rate_limit_middleware,
        ));

    Router::new()
        // Health check (no rate limiting)
        .route("/health", get(handlers::health))
        .merge(api)
        .layer(axum_middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
