//! Common test utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use whatsapp_client::{
    ClientFactory, ClientHandle, ConnectionEvent, CredentialStore, DisconnectReason,
    PairingClient, WhatsAppError,
};
use whatsapp_pairing_proxy::{PhoneNumber, SessionManager};

pub const PHONE: &str = "15551234567";
pub const RAW_CODE: &str = "K7QX9M2P";
pub const USER_ID: &str = "15551234567:4@s.whatsapp.net";

/// Shared record of everything the fake clients were asked to do.
#[derive(Default)]
pub struct FakeState {
    pub creates: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_pairing: AtomicBool,
    pub fail_send: AtomicBool,
    /// Event every new client reports before `create` returns
    pub emit_on_create: Mutex<Option<ConnectionEvent>>,
    senders: Mutex<Vec<mpsc::Sender<ConnectionEvent>>>,
    sent: Mutex<Vec<(String, String)>>,
}

/// Client factory whose clients are driven by the test.
#[derive(Clone, Default)]
pub struct FakeFactory {
    pub state: Arc<FakeState>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Have every client created from now on report `event` immediately.
    pub fn emit_on_create(&self, event: ConnectionEvent) {
        *self.state.emit_on_create.lock().unwrap() = Some(event);
    }

    pub fn creates(&self) -> usize {
        self.state.creates.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Messages sent through any client, as (recipient, payload).
    pub fn sent(&self) -> Vec<(String, String)> {
        self.state.sent.lock().unwrap().clone()
    }

    /// Emit an event on the most recently created client.
    pub async fn emit(&self, event: ConnectionEvent) {
        let sender = self
            .state
            .senders
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no client created yet");
        sender.send(event).await.expect("event receiver dropped");
    }

    pub async fn open(&self) {
        self.emit(ConnectionEvent::Open {
            user_id: USER_ID.into(),
        })
        .await;
    }

    pub async fn close_with(&self, code: u16) {
        self.emit(ConnectionEvent::Closed {
            reason: DisconnectReason::from_status_code(code),
        })
        .await;
    }
}

#[async_trait]
impl ClientFactory for FakeFactory {
    async fn create(
        &self,
        phone: &str,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<ClientHandle, WhatsAppError> {
        self.state.creates.fetch_add(1, Ordering::SeqCst);

        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(WhatsAppError::Api("Version lookup failed: 503".into()));
        }

        // Behave like a real client persisting its first credentials.
        credentials.load().await?;
        credentials
            .save(&json!({
                "me": { "id": format!("{}:4@s.whatsapp.net", phone) },
                "registered": false
            }))
            .await?;

        let (tx, rx) = mpsc::channel(16);
        let early = self.state.emit_on_create.lock().unwrap().clone();
        if let Some(event) = early {
            tx.try_send(event).expect("event channel full");
        }
        self.state.senders.lock().unwrap().push(tx);

        Ok(ClientHandle {
            client: Arc::new(FakeClient {
                state: Arc::clone(&self.state),
                closed: AtomicBool::new(false),
            }),
            events: rx,
        })
    }
}

pub struct FakeClient {
    state: Arc<FakeState>,
    closed: AtomicBool,
}

#[async_trait]
impl PairingClient for FakeClient {
    async fn request_pairing_code(&self, _phone: &str) -> Result<String, WhatsAppError> {
        if self.state.fail_pairing.load(Ordering::SeqCst) {
            return Err(WhatsAppError::Api("Pairing code request failed: 500".into()));
        }
        Ok(RAW_CODE.into())
    }

    async fn send_confirmation(&self, recipient: &str, payload: &str) -> Result<(), WhatsAppError> {
        if self.state.fail_send.load(Ordering::SeqCst) {
            return Err(WhatsAppError::Api("Message send failed: 400".into()));
        }
        self.state
            .sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), payload.to_string()));
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Back-off used by test managers.
pub const TEST_BACKOFF: Duration = Duration::from_millis(10);

/// Reconnection limit used by test managers.
pub const TEST_MAX_RECONNECTS: u32 = 3;

/// A manager backed by `factory`, with credentials under `root`.
pub fn manager(factory: &FakeFactory, root: &std::path::Path) -> Arc<SessionManager> {
    Arc::new(
        SessionManager::new(Arc::new(factory.clone()), root)
            .with_reconnect_policy(TEST_BACKOFF, TEST_MAX_RECONNECTS),
    )
}

pub fn phone() -> PhoneNumber {
    PhoneNumber::parse(PHONE).unwrap()
}

/// Poll `check` until it holds, for up to two seconds.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// True if `code` looks like `XXXX(-X{1,4})*` with alphanumeric groups.
pub fn is_formatted_code(code: &str) -> bool {
    let groups: Vec<&str> = code.split('-').collect();
    let Some((first, rest)) = groups.split_first() else {
        return false;
    };

    let alnum = |g: &str| g.chars().all(|c| c.is_ascii_alphanumeric());
    first.len() == 4
        && alnum(first)
        && rest.iter().all(|g| (1..=4).contains(&g.len()) && alnum(g))
}
