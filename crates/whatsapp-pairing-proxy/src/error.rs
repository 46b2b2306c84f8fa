//! Error types for the pairing proxy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use whatsapp_client::WhatsAppError;

/// Service error types.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid or missing phone number: {0}")]
    InvalidPhoneNumber(String),

    /// Any failure while setting up a client or requesting a code. The
    /// message stays generic; the cause is only logged.
    #[error("Failed to generate pairing code")]
    PairingFailed(#[source] WhatsAppError),

    #[error("No session for phone number: {0}")]
    SessionNotFound(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServiceError::InvalidPhoneNumber(_) => (StatusCode::BAD_REQUEST, "INVALID_PHONE_NUMBER"),
            ServiceError::PairingFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PAIRING_FAILED"),
            ServiceError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
            ServiceError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<WhatsAppError> for ServiceError {
    fn from(e: WhatsAppError) -> Self {
        ServiceError::PairingFailed(e)
    }
}
