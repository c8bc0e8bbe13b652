//! Inbound message event from a chat channel: handed to the relay once per message.

/// Message type as reported by the chat network. Only [`MessageKind::Text`] can activate the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Notice,
    Emote,
    /// Any other message type (image, file, ...), with the network's type name.
    Other(String),
}

/// A room message from a channel, resolved enough for the trigger policy and the webhook envelope.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub sender: String,
    /// Sender display name when the channel knows it.
    pub sender_display_name: Option<String>,
    pub room_id: String,
    pub event_id: String,
    pub kind: MessageKind,
    pub body: String,
    /// Origin server timestamp, Unix ms.
    pub timestamp_ms: u64,
}

impl InboundEvent {
    /// Plain text message with no display name; other fields can be overridden with struct update syntax.
    pub fn text(
        sender: impl Into<String>,
        room_id: impl Into<String>,
        event_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            sender_display_name: None,
            room_id: room_id.into(),
            event_id: event_id.into(),
            kind: MessageKind::Text,
            body: body.into(),
            timestamp_ms: 0,
        }
    }

    /// Display name for the envelope: the member display name, falling back to the sender id.
    pub fn display_name(&self) -> &str {
        self.sender_display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.sender)
    }
}
