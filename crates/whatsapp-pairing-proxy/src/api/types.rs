//! API request and response types.

use crate::session::SessionState;
use serde::{Deserialize, Serialize};

/// Query string shared by the pairing endpoints.
#[derive(Debug, Deserialize)]
pub struct PhoneQuery {
    pub phone: Option<String>,
}

/// Pairing code response, for both new and existing sessions.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairCodeResponse {
    pub phone: String,
    pub pairing_code: String,
    pub message: String,
}

/// Session status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// "active" while a session is stored, "inactive" otherwise
    pub status: String,
    pub phone: String,
    /// Lifecycle detail for stored sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SessionState>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_sessions: usize,
    pub bridge_healthy: bool,
}
