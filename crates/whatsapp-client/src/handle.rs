//! Pairing client capability.
//!
//! The session manager only talks to these traits. The bridge client in
//! [`crate::client`] is the production implementation; tests plug in fakes.

use crate::error::WhatsAppError;
use crate::types::ConnectionEvent;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receiving half of a client's lifecycle event channel.
pub type EventReceiver = mpsc::Receiver<ConnectionEvent>;

/// Credential persistence callback handed to a client at creation.
///
/// The client calls `save` for every credential update before it emits any
/// later event, so an `Open` event always follows the credentials it produced.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load previously saved credentials, `None` for a first-time link.
    async fn load(&self) -> Result<Option<Value>, WhatsAppError>;

    /// Persist updated credentials.
    async fn save(&self, creds: &Value) -> Result<(), WhatsAppError>;
}

/// A live client bound to one phone number.
#[async_trait]
pub trait PairingClient: Send + Sync {
    /// Ask WhatsApp for a device-link pairing code.
    async fn request_pairing_code(&self, phone: &str) -> Result<String, WhatsAppError>;

    /// Send a text message from the linked account.
    async fn send_confirmation(&self, recipient: &str, payload: &str)
        -> Result<(), WhatsAppError>;

    /// Release the underlying connection. Safe to call more than once.
    async fn close(&self);
}

/// A freshly created client together with its event channel.
///
/// The channel exists from the moment the client does, so events emitted
/// before anyone starts listening are buffered rather than lost.
pub struct ClientHandle {
    pub client: Arc<dyn PairingClient>,
    pub events: EventReceiver,
}

/// Creates clients, one per pairing attempt.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Create a client for `phone` that persists credentials through `credentials`.
    async fn create(
        &self,
        phone: &str,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<ClientHandle, WhatsAppError>;

    /// Whether the backing service is reachable.
    async fn health_check(&self) -> bool {
        true
    }
}
