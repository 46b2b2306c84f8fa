//! WhatsApp Web bridge client.
//!
//! Exposes the pairing client capability used by the pairing proxy: create a
//! client per phone number, request a device-link pairing code, follow the
//! connection lifecycle, and send a confirmation once linked.

mod client;
mod error;
mod handle;
mod receiver;
mod types;

pub use client::{BridgeClient, BridgeClientFactory};
pub use error::WhatsAppError;
pub use handle::{ClientFactory, ClientHandle, CredentialStore, EventReceiver, PairingClient};
pub use receiver::EventPoller;
pub use types::*;
