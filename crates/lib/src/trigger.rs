//! Trigger policy: decide whether an inbound message activates the workflow.
//!
//! Gates (own messages, non-text, whitelist) are checked first; then prefix, direct-message and
//! mention triggers are tried in that order and the first match wins. The only suspending step is
//! the joined-member lookup for the direct-message trigger, whose failure counts as "not a DM".

use crate::channels::{InboundEvent, MessageKind, RoomMembers};
use crate::config::RelaySettings;

/// Which trigger fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    Prefix,
    DirectMessage,
    Mention,
}

impl Mechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mechanism::Prefix => "prefix",
            Mechanism::DirectMessage => "direct_message",
            Mechanism::Mention => "mention",
        }
    }
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An activation: the trigger that fired and the text to forward (prefix removed, trimmed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub mechanism: Mechanism,
    pub forwarded_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ignore,
    Activate(Activation),
}

impl Verdict {
    fn activate(mechanism: Mechanism, text: &str) -> Self {
        Verdict::Activate(Activation {
            mechanism,
            forwarded_text: text.trim().to_string(),
        })
    }
}

/// Sender passes the whitelist gate (always true when the whitelist is disabled).
pub fn sender_allowed(settings: &RelaySettings, sender: &str) -> bool {
    !settings.whitelist_enabled || settings.whitelist_members.contains(sender)
}

/// Classify one event. Reads nothing but its arguments, so the same inputs always give the same verdict
/// (given the same member count).
pub async fn classify<R>(
    event: &InboundEvent,
    settings: &RelaySettings,
    self_id: &str,
    members: &R,
) -> Verdict
where
    R: RoomMembers + ?Sized,
{
    if event.sender == self_id {
        return Verdict::Ignore;
    }
    if event.kind != MessageKind::Text {
        return Verdict::Ignore;
    }
    if !sender_allowed(settings, &event.sender) {
        log::debug!("trigger: {} not in whitelist", event.sender);
        return Verdict::Ignore;
    }

    if let Some(prefix) = settings.trigger_prefix.as_deref() {
        if let Some(rest) = event.body.strip_prefix(prefix) {
            return Verdict::activate(Mechanism::Prefix, rest);
        }
    }

    if settings.trigger_on_direct_message {
        match members.joined_member_count(&event.room_id).await {
            Ok(2) => return Verdict::activate(Mechanism::DirectMessage, &event.body),
            Ok(_) => {}
            Err(e) => {
                log::warn!(
                    "trigger: failed to get joined members of {}: {}",
                    event.room_id,
                    e
                );
            }
        }
    }

    if settings.trigger_on_mention && !self_id.is_empty() && event.body.contains(self_id) {
        return Verdict::activate(Mechanism::Mention, &event.body);
    }

    Verdict::Ignore
}
