//! Workflow webhook client: serializes the envelope and makes one bounded HTTP call.

use crate::channels::InboundEvent;
use crate::config::WebhookMethod;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Total budget for one webhook call: connect, send, and reading the response.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(60);

/// JSON body sent to the workflow endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub message: String,
    pub sender: String,
    pub sender_display_name: String,
    pub room_id: String,
    pub event_id: String,
    pub timestamp: u64,
}

impl Envelope {
    pub fn new(event: &InboundEvent, forwarded_text: &str) -> Self {
        Self {
            message: forwarded_text.to_string(),
            sender: event.sender.clone(),
            sender_display_name: event.display_name().to_string(),
            room_id: event.room_id.clone(),
            event_id: event.event_id.clone(),
            timestamp: event.timestamp_ms,
        }
    }
}

/// Failed delivery, by cause. Each variant maps to one user-visible message.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("workflow endpoint returned status {status}: {body}")]
    RemoteRejected { status: u16, body: String },
    #[error("workflow endpoint unreachable: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("{0}")]
    Internal(String),
}

impl DeliveryError {
    /// Text posted back to the room the trigger came from.
    pub fn user_message(&self) -> String {
        match self {
            DeliveryError::RemoteRejected { status, .. } => {
                format!("workflow error: received status {} from the workflow", status)
            }
            DeliveryError::Transport(_) => {
                "workflow error: unable to reach the workflow service".to_string()
            }
            DeliveryError::Internal(cause) => format!("workflow error: {}", cause),
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            DeliveryError::Internal(e.to_string())
        } else {
            DeliveryError::Transport(e)
        }
    }
}

/// HTTP client for the workflow webhook. Cheap to clone; share one per process.
#[derive(Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
}

impl WebhookClient {
    pub fn new() -> Result<Self, DeliveryError> {
        Self::with_timeout(WEBHOOK_TIMEOUT)
    }

    /// Client with a different total timeout (tests use a short one).
    pub fn with_timeout(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Internal(format!("building http client: {}", e)))?;
        Ok(Self { client })
    }

    /// Send the envelope as JSON. Only status 200 counts as delivered.
    pub async fn send(
        &self,
        method: WebhookMethod,
        url: &reqwest::Url,
        envelope: &Envelope,
    ) -> Result<(), DeliveryError> {
        let req = match method {
            WebhookMethod::Post => self.client.post(url.clone()),
            WebhookMethod::Get => self.client.get(url.clone()),
        };
        let res = req.json(envelope).send().await?;
        let status = res.status();
        if status != reqwest::StatusCode::OK {
            let body = res.text().await.unwrap_or_default();
            return Err(DeliveryError::RemoteRejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
