//! Bridge event polling.

use crate::error::WhatsAppError;
use crate::handle::CredentialStore;
use crate::types::*;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, warn};

/// Back-off applied after a failed poll.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Polls a bridge session for events.
pub struct EventPoller {
    client: Client,
    events_url: String,
    poll_interval: Duration,
}

impl EventPoller {
    /// Create a poller for the given session events URL.
    pub fn new(client: Client, events_url: String, poll_interval: Duration) -> Self {
        Self {
            client,
            events_url,
            poll_interval,
        }
    }

    async fn poll(&self) -> Result<Vec<BridgeEvent>, WhatsAppError> {
        let response = self.client.get(&self.events_url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WhatsAppError::Api(format!(
                "Event poll failed: {} - {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    /// Poll forever as an async stream of bridge events.
    pub fn stream(self) -> impl Stream<Item = BridgeEvent> {
        async_stream::stream! {
            loop {
                match self.poll().await {
                    Ok(events) => {
                        for event in events {
                            yield event;
                        }
                    }
                    Err(e) => {
                        error!("Event poll error: {}", e);
                        sleep(ERROR_BACKOFF).await;
                        continue;
                    }
                }

                sleep(self.poll_interval).await;
            }
        }
    }

    /// Drive the stream: persist credential updates and forward lifecycle events.
    ///
    /// Stops after forwarding a close, or when the receiving side goes away.
    pub async fn run(
        self,
        credentials: Arc<dyn CredentialStore>,
        events: mpsc::Sender<ConnectionEvent>,
    ) {
        let stream = self.stream();
        tokio::pin!(stream);

        while let Some(event) = stream.next().await {
            if let BridgeEvent::CredsUpdate { creds } = &event {
                if let Err(e) = credentials.save(creds).await {
                    warn!("Failed to persist credentials: {}", e);
                }
                continue;
            }

            let Some(event) = event.connection_event() else {
                continue;
            };

            let closed = matches!(event, ConnectionEvent::Closed { .. });
            debug!(?event, "Connection event");

            if events.send(event).await.is_err() {
                debug!("Event receiver dropped, stopping poller");
                break;
            }
            if closed {
                break;
            }
        }
    }
}
