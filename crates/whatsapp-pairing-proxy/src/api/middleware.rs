//! Rate limiting and request logging middleware.

use crate::error::ServiceError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Instant,
};
use tracing::{debug, info, warn};

/// Tracked client addresses before idle ones are dropped.
const MAX_TRACKED_CLIENTS: usize = 10_000;

/// Per-client-IP rate limiter.
pub type IpLimiter = DefaultKeyedRateLimiter<IpAddr>;

/// Rate limiter state shared across requests.
#[derive(Clone, Default)]
pub struct RateLimitState {
    /// `None` when rate limiting is disabled
    pub per_ip: Option<Arc<IpLimiter>>,
}

impl RateLimitState {
    /// Allow `requests_per_minute` per client IP; zero disables limiting.
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            per_ip: NonZeroU32::new(requests_per_minute)
                .map(|rpm| Arc::new(RateLimiter::keyed(Quota::per_minute(rpm)))),
        }
    }

    /// No rate limiting.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether a request from `ip` fits in its quota.
    pub fn check(&self, ip: IpAddr) -> bool {
        let Some(limiter) = &self.per_ip else {
            return true;
        };

        if limiter.len() > MAX_TRACKED_CLIENTS {
            limiter.retain_recent();
        }
        limiter.check_key(&ip).is_ok()
    }
}

/// Reject requests over their client's quota with 429.
///
/// Requests without a peer address are not limited.
pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if let Some(ip) = peer {
        if !rate_limit.check(ip) {
            warn!(%ip, uri = %request.uri(), "Rate limit exceeded");
            return Err(ServiceError::RateLimitExceeded);
        }
    }

    Ok(next.run(request).await)
}

/// Log every request with its outcome and latency.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        warn!(%method, %path, %status, ?duration, "Request failed");
    } else if status.is_client_error() {
        info!(%method, %path, %status, ?duration, "Request rejected");
    } else {
        debug!(%method, %path, %status, ?duration, "Request completed");
    }

    response
}
