//! WhatsApp bridge HTTP client.

use crate::error::WhatsAppError;
use crate::handle::{ClientFactory, ClientHandle, CredentialStore, PairingClient};
use crate::receiver::EventPoller;
use crate::types::*;
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use urlencoding::encode;

/// Buffered lifecycle events per client.
const EVENT_BUFFER: usize = 16;

/// Turn a non-success response into an API error.
async fn ensure_success(response: Response, operation: &str) -> Result<Response, WhatsAppError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    warn!(status = %status, body = %body, "Bridge {} failed", operation);

    Err(WhatsAppError::Api(format!(
        "{} failed: {} - {}",
        operation, status, body
    )))
}

/// Creates bridge-backed clients.
#[derive(Clone)]
pub struct BridgeClientFactory {
    client: Client,
    base_url: String,
    poll_interval: Duration,
    browser: Browser,
}

impl BridgeClientFactory {
    /// Create a new factory talking to the bridge at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, WhatsAppError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(1),
            browser: Browser::default(),
        })
    }

    /// Set how often session events are polled.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the browser identity announced when linking.
    pub fn with_browser(mut self, browser: Browser) -> Self {
        self.browser = browser;
        self
    }

    /// Fetch the latest WhatsApp Web protocol version.
    #[instrument(skip(self))]
    pub async fn latest_version(&self) -> Result<[u32; 3], WhatsAppError> {
        let response = self
            .client
            .get(format!("{}/v1/version", self.base_url))
            .send()
            .await?;
        let response = ensure_success(response, "Version lookup").await?;

        let version: VersionResponse = response.json().await?;
        debug!(version = ?version.version, "Fetched protocol version");
        Ok(version.version)
    }

    #[instrument(skip(self, creds))]
    async fn open_session(
        &self,
        phone: &str,
        version: [u32; 3],
        creds: Option<&serde_json::Value>,
    ) -> Result<String, WhatsAppError> {
        let request = CreateSessionRequest {
            phone,
            version,
            browser: self.browser.as_triple(),
            creds,
        };

        let response = self
            .client
            .post(format!("{}/v1/sessions", self.base_url))
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(response, "Session creation").await?;

        let session: CreateSessionResponse = response.json().await?;
        Ok(session.id)
    }
}

#[async_trait]
impl ClientFactory for BridgeClientFactory {
    async fn create(
        &self,
        phone: &str,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<ClientHandle, WhatsAppError> {
        let version = self.latest_version().await?;
        let creds = credentials.load().await?;

        let session_id = self.open_session(phone, version, creds.as_ref()).await?;
        let session_url = format!("{}/v1/sessions/{}", self.base_url, encode(&session_id));
        info!(session_id = %session_id, resumed = creds.is_some(), "Bridge session opened");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let poller = EventPoller::new(
            self.client.clone(),
            format!("{}/events", session_url),
            self.poll_interval,
        );
        let task = tokio::spawn(poller.run(credentials, tx));

        let client = BridgeClient {
            client: self.client.clone(),
            session_url,
            poller: Mutex::new(Some(task)),
            closed: AtomicBool::new(false),
        };

        Ok(ClientHandle {
            client: Arc::new(client),
            events: rx,
        })
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/v1/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// One bridge session bound to a phone number.
pub struct BridgeClient {
    client: Client,
    session_url: String,
    poller: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl BridgeClient {
    fn ensure_open(&self) -> Result<(), WhatsAppError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WhatsAppError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl PairingClient for BridgeClient {
    #[instrument(skip(self))]
    async fn request_pairing_code(&self, phone: &str) -> Result<String, WhatsAppError> {
        self.ensure_open()?;

        let response = self
            .client
            .post(format!("{}/pairing-code", self.session_url))
            .json(&PairingCodeRequest { phone })
            .send()
            .await?;
        let response = ensure_success(response, "Pairing code request").await?;

        let pairing: PairingCodeResponse = response.json().await?;
        Ok(pairing.code)
    }

    #[instrument(skip(self, payload))]
    async fn send_confirmation(&self, recipient: &str, payload: &str) -> Result<(), WhatsAppError> {
        self.ensure_open()?;

        let response = self
            .client
            .post(format!("{}/messages", self.session_url))
            .json(&SendMessageRequest {
                to: recipient,
                text: payload,
            })
            .send()
            .await?;
        ensure_success(response, "Message send").await?;

        debug!("Sent confirmation to {}", recipient);
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let task = self.poller.lock().ok().and_then(|mut guard| guard.take());
        if let Some(task) = task {
            task.abort();
        }

        match self.client.delete(&self.session_url).send().await {
            Ok(r) if r.status().is_success() => debug!("Bridge session closed"),
            Ok(r) => warn!(status = %r.status(), "Bridge session close rejected"),
            Err(e) => warn!("Bridge session close failed: {}", e),
        }
    }
}
