//! Delivery pipeline: one webhook call per activation, wrapped in the typing indicator, with failures
//! reported back to the room.
//!
//! Order per message: typing start (if enabled) -> webhook call -> error reply (on failure) ->
//! typing stop (if enabled). No retries.

use crate::channels::{ChatClient, InboundEvent};
use crate::config::RelaySettings;
use crate::trigger::Activation;
use crate::webhook::{DeliveryError, Envelope, WebhookClient};
use std::sync::Arc;

/// How long the typing indicator may stay up if the stop never arrives.
pub const TYPING_TIMEOUT_MS: u64 = 30_000;

/// Typing indicator for one room. Call [`TypingGuard::stop`]; if the guard is dropped without it
/// (task cancelled or panicked), the stop is sent from a spawned task instead.
pub struct TypingGuard {
    client: Arc<dyn ChatClient>,
    room_id: String,
    active: bool,
}

impl TypingGuard {
    /// Send typing start. Failure is logged and the guard is still returned, so stop is always sent.
    pub async fn start(client: Arc<dyn ChatClient>, room_id: &str) -> Self {
        if let Err(e) = client.send_typing(room_id, true, TYPING_TIMEOUT_MS).await {
            log::debug!("delivery: typing start in {} failed: {}", room_id, e);
        }
        Self {
            client,
            room_id: room_id.to_string(),
            active: true,
        }
    }

    pub async fn stop(mut self) {
        self.active = false;
        if let Err(e) = self.client.send_typing(&self.room_id, false, 0).await {
            log::debug!("delivery: typing stop in {} failed: {}", self.room_id, e);
        }
    }
}

impl Drop for TypingGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let client = self.client.clone();
        let room_id = std::mem::take(&mut self.room_id);
        handle.spawn(async move {
            if let Err(e) = client.send_typing(&room_id, false, 0).await {
                log::debug!("delivery: typing stop in {} failed: {}", room_id, e);
            }
        });
    }
}

/// Forward an activated message to the workflow and report a failure (exactly one message) to the room.
/// A successful delivery sends nothing: the workflow answers through the chat network itself.
pub async fn deliver(
    activation: &Activation,
    event: &InboundEvent,
    settings: &RelaySettings,
    client: Arc<dyn ChatClient>,
    webhook: &WebhookClient,
) -> Result<(), DeliveryError> {
    let envelope = Envelope::new(event, &activation.forwarded_text);

    let typing = if settings.signal_typing {
        Some(TypingGuard::start(client.clone(), &event.room_id).await)
    } else {
        None
    };

    log::debug!(
        "delivery: sending message to workflow: {}",
        preview(&envelope.message, 50)
    );
    let result = webhook
        .send(settings.webhook_method, &settings.webhook_url, &envelope)
        .await;

    match &result {
        Ok(()) => {
            log::info!(
                "delivery: triggered workflow for message from {} ({})",
                event.sender,
                activation.mechanism
            );
        }
        Err(e) => {
            match e {
                DeliveryError::RemoteRejected { status, body } => {
                    log::error!("delivery: webhook returned status {}: {}", status, body);
                }
                DeliveryError::Transport(cause) => {
                    log::error!("delivery: network error calling webhook: {}", cause);
                }
                DeliveryError::Internal(cause) => {
                    log::error!("delivery: unexpected error calling webhook: {}", cause);
                }
            }
            if let Err(send_err) = client
                .reply_to(&event.room_id, &event.event_id, &e.user_message())
                .await
            {
                log::warn!("delivery: failed to report error to {}: {}", event.room_id, send_err);
            }
        }
    }

    if let Some(typing) = typing {
        typing.stop().await;
    }
    result
}

/// First `max_chars` characters of `s`, with "..." when cut.
fn preview(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => format!("{}...", &s[..i]),
        None => s.to_string(),
    }
}
