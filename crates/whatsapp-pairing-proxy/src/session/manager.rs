//! Session lifecycle: pairing requests, connection events, reconnection.

use super::{format_pairing_code, AuthDir, PhoneNumber, Session, SessionState, SessionStore};
use crate::error::ServiceError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use whatsapp_client::{
    ClientFactory, ClientHandle, ConnectionEvent, DisconnectReason, EventReceiver, PairingClient,
};

/// Result of a pairing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// A new session was created with this code.
    New(String),
    /// A session already existed; its original code is returned.
    Existing(String),
}

impl PairingOutcome {
    pub fn code(&self) -> &str {
        match self {
            PairingOutcome::New(code) | PairingOutcome::Existing(code) => code,
        }
    }
}

/// Wait between a transient close and the replacement client.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Reconnections allowed per session before it is marked failed.
pub const DEFAULT_MAX_RECONNECTS: u32 = 5;

/// Confirmation message carrying the persisted session data.
pub fn confirmation_message(session_data: &str) -> String {
    format!(
        "✅ *Connected Successfully!*\n\nHere is your session data:\n```{}```",
        session_data
    )
}

/// Owns the session store and reacts to client connection events.
///
/// Each phone number gets one driver task that handles its events in order,
/// so a session is only ever mutated by its own driver once created.
pub struct SessionManager {
    store: RwLock<SessionStore>,
    /// Per-phone creation locks. An entry is dropped once its phone has no
    /// session and no request holds the lock.
    creation_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    factory: Arc<dyn ClientFactory>,
    sessions_root: PathBuf,
    reconnect_backoff: Duration,
    max_reconnects: u32,
}

impl SessionManager {
    /// Create a manager using `factory` for clients and `sessions_root` for credentials.
    pub fn new(factory: Arc<dyn ClientFactory>, sessions_root: impl Into<PathBuf>) -> Self {
        Self {
            store: RwLock::new(SessionStore::new()),
            creation_locks: Mutex::new(HashMap::new()),
            factory,
            sessions_root: sessions_root.into(),
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            max_reconnects: DEFAULT_MAX_RECONNECTS,
        }
    }

    /// Set the wait before each reconnection and how many are allowed.
    pub fn with_reconnect_policy(mut self, backoff: Duration, max_reconnects: u32) -> Self {
        self.reconnect_backoff = backoff;
        self.max_reconnects = max_reconnects;
        self
    }

    fn auth_dir(&self, phone: &PhoneNumber) -> AuthDir {
        AuthDir::new(&self.sessions_root, phone)
    }

    async fn creation_lock(&self, phone: &PhoneNumber) -> Arc<Mutex<()>> {
        let mut locks = self.creation_locks.lock().await;
        Arc::clone(locks.entry(phone.as_str().to_string()).or_default())
    }

    /// Forget the creation lock for `phone` unless a request still holds it.
    ///
    /// Lock handles are only cloned under the map mutex, so a strong count of
    /// one means nobody is waiting on it.
    async fn prune_creation_lock(&self, phone: &PhoneNumber) {
        let mut locks = self.creation_locks.lock().await;
        if locks
            .get(phone.as_str())
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(phone.as_str());
        }
    }

    /// Return the pairing code for `phone`, creating a session if none exists.
    ///
    /// At most one client is created per phone number; concurrent requests
    /// for the same number wait for the first one and get its code.
    #[instrument(skip(self, phone), fields(phone_number = %phone))]
    pub async fn request_pairing(
        self: &Arc<Self>,
        phone: &PhoneNumber,
    ) -> Result<PairingOutcome, ServiceError> {
        let lock = self.creation_lock(phone).await;
        let result = {
            let _guard = lock.lock().await;
            self.create_or_reuse(phone).await
        };
        drop(lock);

        if result.is_err() {
            self.prune_creation_lock(phone).await;
        }
        result
    }

    async fn create_or_reuse(
        self: &Arc<Self>,
        phone: &PhoneNumber,
    ) -> Result<PairingOutcome, ServiceError> {
        if let Some(session) = self.store.read().await.get(phone) {
            debug!("Session already active, returning existing code");
            return Ok(PairingOutcome::Existing(session.pairing_code().to_string()));
        }

        let (handle, code) = self.start_client(phone).await.map_err(|e| {
            error!(error = %e, "Error generating pairing code");
            e
        })?;

        self.store
            .write()
            .await
            .insert(Session::new(phone.clone(), code.clone(), handle.client));

        // The event channel has buffered since creation, so nothing emitted
        // before this point is lost.
        self.spawn_driver(phone.clone(), handle.events);

        info!("Pairing code generated");
        Ok(PairingOutcome::New(code))
    }

    /// Create a client for `phone` and request a formatted pairing code.
    ///
    /// The client is closed again if the code request fails.
    async fn start_client(
        &self,
        phone: &PhoneNumber,
    ) -> Result<(ClientHandle, String), ServiceError> {
        let credentials = Arc::new(self.auth_dir(phone));
        let handle = self.factory.create(phone.as_str(), credentials).await?;

        match handle.client.request_pairing_code(phone.as_str()).await {
            Ok(raw) => Ok((handle, format_pairing_code(&raw))),
            Err(e) => {
                handle.client.close().await;
                Err(e.into())
            }
        }
    }

    fn spawn_driver(self: &Arc<Self>, phone: PhoneNumber, events: EventReceiver) {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.drive(phone, events).await });
    }

    /// Handle one phone's connection events until the session settles.
    async fn drive(self: Arc<Self>, phone: PhoneNumber, mut events: EventReceiver) {
        loop {
            let Some(event) = events.recv().await else {
                debug!(phone_number = %phone, "Event stream ended");
                return;
            };

            match event {
                ConnectionEvent::Open { user_id } => {
                    self.on_open(&phone, &user_id).await;
                    return;
                }
                ConnectionEvent::Closed { reason } if reason.is_terminal() => {
                    warn!(phone_number = %phone, "Connection closed: logged out, not reconnecting");
                    self.abandon(&phone, SessionState::LoggedOut).await;
                    return;
                }
                ConnectionEvent::Closed { reason } => {
                    let reconnects = self.reconnects(&phone).await.unwrap_or(0);
                    if reconnects >= self.max_reconnects {
                        warn!(
                            phone_number = %phone,
                            ?reason,
                            reconnects,
                            "Connection closed: reconnect limit reached"
                        );
                        self.abandon(&phone, SessionState::Failed).await;
                        return;
                    }

                    match self.reconnect(&phone, reason).await {
                        Ok(next) => events = next,
                        Err(e) => {
                            error!(phone_number = %phone, error = %e, "Reconnection failed");
                            self.set_state(&phone, SessionState::Failed).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Deliver the persisted credentials to the linked account, then drop the session.
    async fn on_open(&self, phone: &PhoneNumber, user_id: &str) {
        info!(phone_number = %phone, "Connected successfully");

        let client = self.store.read().await.get(phone).map(|s| s.client());
        let Some(client) = client else {
            warn!(phone_number = %phone, "Connection opened for unknown session");
            return;
        };

        if user_id.is_empty() {
            warn!(phone_number = %phone, "Connection opened without a user id, not sending session data");
        } else {
            self.send_session_data(phone, user_id, client.as_ref()).await;
        }

        let removed = self.store.write().await.remove(phone);
        if let Some(session) = removed {
            debug!(
                phone_number = %phone,
                reconnects = session.reconnects,
                elapsed = ?(chrono::Utc::now() - session.created_at).to_std().ok(),
                "Session completed"
            );
            session.client().close().await;
        }
        self.prune_creation_lock(phone).await;
    }

    async fn send_session_data(
        &self,
        phone: &PhoneNumber,
        user_id: &str,
        client: &dyn PairingClient,
    ) {
        match self.auth_dir(phone).read_raw().await {
            Ok(session_data) => {
                if let Err(e) = client
                    .send_confirmation(user_id, &confirmation_message(&session_data))
                    .await
                {
                    error!(phone_number = %phone, error = %e, "Failed to send session data");
                }
            }
            Err(e) => {
                error!(phone_number = %phone, error = %e, "Failed to read session data");
            }
        }
    }

    /// Settle the session in a terminal `state` and release its client.
    /// The session stays in the store.
    async fn abandon(&self, phone: &PhoneNumber, state: SessionState) {
        let client = {
            let mut store = self.store.write().await;
            store.get_mut(phone).map(|session| {
                session.state = state;
                session.client()
            })
        };

        if let Some(client) = client {
            client.close().await;
        }
    }

    /// Replace the session's client after a transient close.
    ///
    /// The old client is closed, then the manager waits out the back-off
    /// before creating the new one. The new code is logged; the session
    /// keeps the code it was created with.
    async fn reconnect(
        &self,
        phone: &PhoneNumber,
        reason: DisconnectReason,
    ) -> Result<EventReceiver, ServiceError> {
        warn!(phone_number = %phone, ?reason, "Connection closed, reconnecting");

        let old = {
            let mut store = self.store.write().await;
            let session = store
                .get_mut(phone)
                .ok_or_else(|| ServiceError::SessionNotFound(phone.to_string()))?;
            session.state = SessionState::Reconnecting;
            session.client()
        };
        old.close().await;

        sleep(self.reconnect_backoff).await;

        let (handle, code) = self.start_client(phone).await?;

        let installed = {
            let mut store = self.store.write().await;
            match store.get_mut(phone) {
                Some(session) => {
                    session.install_client(Arc::clone(&handle.client));
                    true
                }
                None => false,
            }
        };

        if !installed {
            handle.client.close().await;
            return Err(ServiceError::SessionNotFound(phone.to_string()));
        }

        info!(phone_number = %phone, pairing_code = %code, "Reconnected with a new pairing code");
        Ok(handle.events)
    }

    async fn set_state(&self, phone: &PhoneNumber, state: SessionState) {
        if let Some(session) = self.store.write().await.get_mut(phone) {
            session.state = state;
        }
    }

    /// Lifecycle state for `phone`, `None` when no session exists.
    pub async fn status(&self, phone: &PhoneNumber) -> Option<SessionState> {
        self.store.read().await.get(phone).map(|s| s.state)
    }

    /// Pairing code of the stored session, if any.
    pub async fn pairing_code(&self, phone: &PhoneNumber) -> Option<String> {
        self.store
            .read()
            .await
            .get(phone)
            .map(|s| s.pairing_code().to_string())
    }

    /// Reconnections performed for the stored session, if any.
    pub async fn reconnects(&self, phone: &PhoneNumber) -> Option<u32> {
        self.store.read().await.get(phone).map(|s| s.reconnects)
    }

    /// Number of stored sessions.
    pub async fn count(&self) -> usize {
        self.store.read().await.count()
    }

    /// Whether the client backend is reachable.
    pub async fn bridge_healthy(&self) -> bool {
        self.factory.health_check().await
    }

    /// Drop every session and close its client.
    pub async fn shutdown(&self) {
        let sessions = self.store.write().await.drain();
        info!("Closing {} sessions", sessions.len());

        for session in sessions {
            session.client().close().await;
        }
    }
}
