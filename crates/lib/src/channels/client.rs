//! Chat client capabilities the relay depends on. Implemented by channel adapters (e.g. Matrix)
//! and by recording fakes in tests.

use async_trait::async_trait;

/// Joined-member lookup used by the direct-message trigger.
#[async_trait]
pub trait RoomMembers: Send + Sync {
    /// Number of members currently joined to the room. May hit the network and fail.
    async fn joined_member_count(&self, room_id: &str) -> Result<u64, String>;
}

/// Handle to a connected chat account: identity, presence, and sending.
#[async_trait]
pub trait ChatClient: RoomMembers {
    /// The account's own user id (e.g. "@bot:example.org").
    fn user_id(&self) -> &str;

    /// Start (`typing == true`) or stop the typing indicator in a room.
    async fn send_typing(&self, room_id: &str, typing: bool, timeout_ms: u64)
        -> Result<(), String>;

    /// Send a read receipt for an event.
    async fn mark_read(&self, room_id: &str, event_id: &str) -> Result<(), String>;

    /// Send a plain text message to a room.
    async fn send_text(&self, room_id: &str, text: &str) -> Result<(), String>;

    /// Send a plain text message as a reply to an event. Default sends it without the reply relation.
    async fn reply_to(&self, room_id: &str, _event_id: &str, text: &str) -> Result<(), String> {
        self.send_text(room_id, text).await
    }
}
