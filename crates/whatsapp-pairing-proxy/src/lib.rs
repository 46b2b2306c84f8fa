//! WhatsApp Pairing Proxy - device-link pairing code service.
//!
//! Given a phone number, the proxy asks a WhatsApp Web bridge for a pairing
//! code and holds the pairing session in memory until the device is linked:
//! - Idempotent code issuance per phone number
//! - Session data delivered to the linked account on success
//! - Automatic reconnection on transient disconnects

pub mod api;
pub mod config;
pub mod error;
pub mod session;

pub use config::Config;
pub use error::ServiceError;
pub use session::{PairingOutcome, PhoneNumber, SessionManager, SessionState};
