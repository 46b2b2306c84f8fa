//! WhatsApp bridge types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why a connection was closed, mapped from the protocol status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The account was logged out or the link was rejected (401).
    LoggedOut,
    Forbidden,
    TimedOut,
    MultideviceMismatch,
    ConnectionClosed,
    ConnectionReplaced,
    BadSession,
    Unavailable,
    /// The server asks for a fresh connection, usually right after pairing (515).
    RestartRequired,
    Unknown(u16),
}

impl DisconnectReason {
    /// Map a protocol status code to a disconnect reason.
    pub fn from_status_code(code: u16) -> Self {
        match code {
            401 => Self::LoggedOut,
            403 => Self::Forbidden,
            408 => Self::TimedOut,
            411 => Self::MultideviceMismatch,
            428 => Self::ConnectionClosed,
            440 => Self::ConnectionReplaced,
            500 => Self::BadSession,
            503 => Self::Unavailable,
            515 => Self::RestartRequired,
            other => Self::Unknown(other),
        }
    }

    /// Terminal reasons must not be retried.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

/// Connection lifecycle event emitted by a pairing client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The device link completed and the connection is authenticated.
    Open {
        /// JID of the now-linked account, used as the confirmation recipient.
        user_id: String,
    },
    /// The connection went away.
    Closed { reason: DisconnectReason },
}

/// Browser identity announced to WhatsApp when linking a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Browser {
    pub platform: String,
    pub name: String,
    pub release: String,
}

impl Browser {
    /// A Windows desktop browser with the given name.
    pub fn windows(name: impl Into<String>) -> Self {
        Self {
            platform: "Windows".into(),
            name: name.into(),
            release: "10.0.22631".into(),
        }
    }

    pub(crate) fn as_triple(&self) -> [&str; 3] {
        [self.platform.as_str(), self.name.as_str(), self.release.as_str()]
    }
}

impl Default for Browser {
    fn default() -> Self {
        Self::windows("Firefox")
    }
}

/// Latest protocol version response.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionResponse {
    pub version: [u32; 3],
}

/// Request to open a bridge session.
#[derive(Debug, Serialize)]
pub struct CreateSessionRequest<'a> {
    pub phone: &'a str,
    pub version: [u32; 3],
    pub browser: [&'a str; 3],
    pub creds: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct PairingCodeRequest<'a> {
    pub phone: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct PairingCodeResponse {
    pub code: String,
}

/// Outgoing text message.
#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub to: &'a str,
    pub text: &'a str,
}

/// Linked account identity reported with an open connection.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeUser {
    pub id: String,
}

/// Raw event as reported by the bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeEvent {
    #[serde(rename = "creds.update")]
    CredsUpdate { creds: Value },

    #[serde(rename = "connection.update")]
    ConnectionUpdate {
        #[serde(default)]
        connection: Option<String>,
        #[serde(default)]
        user: Option<BridgeUser>,
        #[serde(default, rename = "statusCode")]
        status_code: Option<u16>,
    },

    #[serde(other)]
    Other,
}

impl BridgeEvent {
    /// Lifecycle event carried by this bridge event, if any.
    ///
    /// A close without a status code is treated as a plain closed connection.
    pub fn connection_event(&self) -> Option<ConnectionEvent> {
        let BridgeEvent::ConnectionUpdate {
            connection,
            user,
            status_code,
        } = self
        else {
            return None;
        };

        match connection.as_deref() {
            Some("open") => Some(ConnectionEvent::Open {
                user_id: user.as_ref().map(|u| u.id.clone()).unwrap_or_default(),
            }),
            Some("close") => Some(ConnectionEvent::Closed {
                reason: DisconnectReason::from_status_code(status_code.unwrap_or(428)),
            }),
            _ => None,
        }
    }
}
