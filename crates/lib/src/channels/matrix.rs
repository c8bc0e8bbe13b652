//! Matrix channel: wraps `matrix_channel::MatrixChannel` as a [`ChatClient`] and converts its room
//! messages into [`InboundEvent`]s.

use crate::channels::client::{ChatClient, RoomMembers};
use crate::channels::inbound::{InboundEvent, MessageKind};
use async_trait::async_trait;
use matrix_channel::{MatrixChannel, MatrixLogin, MatrixMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct MatrixChatClient {
    channel: Arc<MatrixChannel>,
}

impl MatrixChatClient {
    pub async fn connect(login: MatrixLogin) -> Result<Self, String> {
        let channel = MatrixChannel::connect(login).await?;
        Ok(Self {
            channel: Arc::new(channel),
        })
    }

    /// Start syncing and forward every room message to `inbound_tx`. Returns the sync and forwarding tasks.
    pub async fn start_inbound(
        &self,
        inbound_tx: mpsc::Sender<InboundEvent>,
    ) -> Result<Vec<JoinHandle<()>>, String> {
        let (raw_tx, mut raw_rx) = mpsc::channel::<MatrixMessage>(64);
        let sync = self.channel.start_inbound(raw_tx).await?;
        let forward = tokio::spawn(async move {
            while let Some(msg) = raw_rx.recv().await {
                if inbound_tx.send(inbound_event(msg)).await.is_err() {
                    log::debug!("matrix: inbound channel closed, stopping forwarder");
                    return;
                }
            }
        });
        Ok(vec![sync, forward])
    }
}

fn message_kind(msgtype: &str) -> MessageKind {
    match msgtype {
        "m.text" => MessageKind::Text,
        "m.notice" => MessageKind::Notice,
        "m.emote" => MessageKind::Emote,
        other => MessageKind::Other(other.to_string()),
    }
}

fn inbound_event(msg: MatrixMessage) -> InboundEvent {
    InboundEvent {
        kind: message_kind(&msg.msgtype),
        sender: msg.sender,
        sender_display_name: msg.sender_display_name,
        room_id: msg.room_id,
        event_id: msg.event_id,
        body: msg.body,
        timestamp_ms: msg.origin_server_ts,
    }
}

#[async_trait]
impl RoomMembers for MatrixChatClient {
    async fn joined_member_count(&self, room_id: &str) -> Result<u64, String> {
        self.channel.joined_member_count(room_id).await
    }
}

#[async_trait]
impl ChatClient for MatrixChatClient {
    fn user_id(&self) -> &str {
        self.channel.user_id()
    }

    async fn send_typing(
        &self,
        room_id: &str,
        typing: bool,
        _timeout_ms: u64,
    ) -> Result<(), String> {
        self.channel.set_typing(room_id, typing).await
    }

    async fn mark_read(&self, room_id: &str, event_id: &str) -> Result<(), String> {
        self.channel.mark_read(room_id, event_id).await
    }

    async fn send_text(&self, room_id: &str, text: &str) -> Result<(), String> {
        self.channel.send_text(room_id, text).await
    }

    async fn reply_to(&self, room_id: &str, event_id: &str, text: &str) -> Result<(), String> {
        self.channel.send_reply(room_id, event_id, text).await
    }
}
