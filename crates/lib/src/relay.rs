//! Per-message dispatcher: status command, trigger policy, then delivery.
//!
//! Each inbound event is handled in its own task against one settings snapshot; a reload only
//! affects events handled after it.

use crate::channels::{ChatClient, InboundEvent, MessageKind};
use crate::config::{self, RelaySettings};
use crate::delivery;
use crate::trigger::{self, Verdict};
use crate::webhook::WebhookClient;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Sent to the room when the relay has no valid configuration.
pub const CONFIG_MISSING_REPLY: &str = "workflow error: relay configuration not found or invalid";

/// Static reply to the status command.
pub const STATUS_REPLY: &str = "hookrelay is running";

/// What happened to one inbound event (returned for logging and tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Own or non-text message, or the trigger policy said no.
    Ignored,
    /// No valid settings; the fixed error was sent to the room.
    ConfigMissing,
    /// Status command answered.
    Status,
    /// Webhook returned 200.
    Delivered,
    /// Delivery failed and the error was reported to the room.
    Failed,
}

pub struct Relay {
    client: Arc<dyn ChatClient>,
    webhook: WebhookClient,
    settings: RwLock<Option<Arc<RelaySettings>>>,
}

impl Relay {
    /// `settings` is `None` when configuration failed to load; every message then gets the config error.
    pub fn new(
        client: Arc<dyn ChatClient>,
        webhook: WebhookClient,
        settings: Option<RelaySettings>,
    ) -> Self {
        Self {
            client,
            webhook,
            settings: RwLock::new(settings.map(Arc::new)),
        }
    }

    /// Replace the settings snapshot for messages handled from now on.
    pub async fn reload(&self, settings: RelaySettings) {
        *self.settings.write().await = Some(Arc::new(settings));
        log::info!("relay: settings reloaded");
    }

    pub async fn settings(&self) -> Option<Arc<RelaySettings>> {
        self.settings.read().await.clone()
    }

    /// Handle one inbound event end to end. Never fails: errors are logged or reported to the room.
    pub async fn handle_event(&self, event: InboundEvent) -> Outcome {
        let self_id = self.client.user_id();
        if event.sender == self_id {
            return Outcome::Ignored;
        }
        // Notices are bot output (ours go out as notices too); only text gets any answer.
        if event.kind != MessageKind::Text {
            return Outcome::Ignored;
        }

        let Some(settings) = self.settings().await else {
            if let Err(e) = self.client.send_text(&event.room_id, CONFIG_MISSING_REPLY).await {
                log::warn!("relay: failed to send config error to {}: {}", event.room_id, e);
            }
            return Outcome::ConfigMissing;
        };

        if let Some(cmd) = settings.status_command.as_deref() {
            if event.body.trim() == cmd && trigger::sender_allowed(&settings, &event.sender) {
                if let Err(e) = self.client.send_text(&event.room_id, STATUS_REPLY).await {
                    log::warn!("relay: failed to send status reply to {}: {}", event.room_id, e);
                }
                return Outcome::Status;
            }
        }

        let activation =
            match trigger::classify(&event, &settings, self_id, self.client.as_ref()).await {
                Verdict::Ignore => return Outcome::Ignored,
                Verdict::Activate(a) => a,
            };
        log::info!(
            "relay: {} activated by {} in {}",
            activation.mechanism,
            event.sender,
            event.room_id
        );

        if let Err(e) = self.client.mark_read(&event.room_id, &event.event_id).await {
            log::debug!("relay: mark_read failed for {}: {}", event.event_id, e);
        }

        match delivery::deliver(
            &activation,
            &event,
            &settings,
            self.client.clone(),
            &self.webhook,
        )
        .await
        {
            Ok(()) => Outcome::Delivered,
            Err(_) => Outcome::Failed,
        }
    }
}

/// Re-read the config file and swap in its relay settings. On any error the current settings stay.
pub async fn reload_from_file(relay: &Relay, config_path: &Path) -> anyhow::Result<()> {
    let (config, _) = config::load_config(Some(config_path.to_path_buf()))?;
    let settings = config::relay_settings(&config)?;
    log::info!("relay: reloading, webhook URL: {}", settings.webhook_url);
    relay.reload(settings).await;
    Ok(())
}

/// Spawn the inbound loop: one task per event, so a slow webhook never holds up the next message.
/// The loop ends when the sender side of `inbound_rx` is dropped.
pub fn run(relay: Arc<Relay>, mut inbound_rx: mpsc::Receiver<InboundEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = inbound_rx.recv().await {
            let relay = relay.clone();
            tokio::spawn(async move {
                let event_id = event.event_id.clone();
                let outcome = relay.handle_event(event).await;
                log::debug!("relay: {} -> {:?}", event_id, outcome);
            });
        }
        log::info!("relay: inbound channel closed, stopping");
    })
}
