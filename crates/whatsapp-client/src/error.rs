//! WhatsApp client errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WhatsAppError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bridge API error: {0}")]
    Api(String),

    #[error("Credential storage error: {0}")]
    Credentials(String),

    #[error("Client closed")]
    Closed,
}
