//! Pairing sessions, their store, and their lifecycle.

mod auth;
mod manager;
mod store;

pub use auth::AuthDir;
pub use manager::{
    confirmation_message, PairingOutcome, SessionManager, DEFAULT_MAX_RECONNECTS,
    DEFAULT_RECONNECT_BACKOFF,
};
pub use store::SessionStore;

use crate::error::ServiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use whatsapp_client::PairingClient;

/// Shortest accepted phone number, in digits.
pub const MIN_PHONE_DIGITS: usize = 10;

/// Longest accepted phone number, in digits.
pub const MAX_PHONE_DIGITS: usize = 15;

/// Pairing code group width.
const CODE_GROUP: usize = 4;

/// Check a phone number: 10 to 15 ASCII digits, nothing else.
pub fn is_valid_phone_number(phone: &str) -> bool {
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&phone.len())
        && phone.bytes().all(|b| b.is_ascii_digit())
}

/// A validated phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Validate and wrap a phone number.
    pub fn parse(phone: &str) -> Result<Self, ServiceError> {
        if is_valid_phone_number(phone) {
            Ok(Self(phone.to_string()))
        } else {
            Err(ServiceError::InvalidPhoneNumber(format!(
                "expected {} to {} digits",
                MIN_PHONE_DIGITS, MAX_PHONE_DIGITS
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Split a raw pairing code into hyphen-separated groups of four.
///
/// The last group keeps whatever is left; nothing is padded.
pub fn format_pairing_code(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    chars
        .chunks(CODE_GROUP)
        .map(|group| group.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

/// Where a stored session is in its lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Code issued, waiting for the user to link the device
    Pending,
    /// Connection dropped, a fresh client is being set up
    Reconnecting,
    /// WhatsApp rejected the link; no further attempts
    LoggedOut,
    /// Reconnection failed; no further attempts
    Failed,
}

/// One in-progress pairing attempt.
pub struct Session {
    /// Phone number the session belongs to
    pub phone_number: PhoneNumber,

    /// Formatted pairing code handed to the caller
    pairing_code: String,

    /// Client currently bound to this phone number
    client: Arc<dyn PairingClient>,

    /// Lifecycle state
    pub state: SessionState,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// Number of reconnections after transient closes
    pub reconnects: u32,
}

impl Session {
    /// Create a new pending session.
    pub fn new(
        phone_number: PhoneNumber,
        pairing_code: String,
        client: Arc<dyn PairingClient>,
    ) -> Self {
        Self {
            phone_number,
            pairing_code,
            client,
            state: SessionState::Pending,
            created_at: Utc::now(),
            reconnects: 0,
        }
    }

    pub fn pairing_code(&self) -> &str {
        &self.pairing_code
    }

    /// Shared handle to the current client.
    pub fn client(&self) -> Arc<dyn PairingClient> {
        Arc::clone(&self.client)
    }

    /// Install a replacement client. The previous one must already be closed.
    pub fn install_client(&mut self, client: Arc<dyn PairingClient>) {
        self.client = client;
        self.reconnects += 1;
        self.state = SessionState::Pending;
    }
}
