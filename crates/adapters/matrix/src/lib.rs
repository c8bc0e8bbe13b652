//! Matrix channel: log in (or restore a saved session), sync, forward room messages, and expose the
//! room operations the relay needs (member count, typing, receipts, text and replies).

#![recursion_limit = "256"]

use matrix_sdk::authentication::matrix::MatrixSession;
use matrix_sdk::config::SyncSettings;
use matrix_sdk::ruma::api::client::receipt::create_receipt::v3::ReceiptType;
use matrix_sdk::ruma::events::receipt::ReceiptThread;
use matrix_sdk::ruma::events::relation::InReplyTo;
use matrix_sdk::ruma::events::room::message::{
    OriginalSyncRoomMessageEvent, Relation, RoomMessageEventContent,
};
use matrix_sdk::ruma::{EventId, OwnedEventId, RoomId};
use matrix_sdk::{Client, Room, RoomMemberships, RoomState};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const SESSION_FILE: &str = "session.json";
const DEFAULT_DEVICE_NAME: &str = "hookrelay";

/// Account and storage settings for [`MatrixChannel::connect`].
#[derive(Debug, Clone)]
pub struct MatrixLogin {
    pub homeserver: String,
    pub user_id: String,
    pub password: Option<String>,
    pub device_name: Option<String>,
    /// Directory for the sqlite store and `session.json`.
    pub store_dir: PathBuf,
}

/// A room message as received from sync.
#[derive(Debug, Clone)]
pub struct MatrixMessage {
    pub sender: String,
    pub sender_display_name: Option<String>,
    pub room_id: String,
    pub event_id: String,
    /// e.g. "m.text", "m.notice", "m.image".
    pub msgtype: String,
    pub body: String,
    pub origin_server_ts: u64,
}

#[derive(Serialize, Deserialize)]
struct SavedSession {
    homeserver: String,
    session: MatrixSession,
}

/// Logged-in Matrix account.
pub struct MatrixChannel {
    client: Client,
    user_id: String,
}

impl MatrixChannel {
    /// Build the client, then restore the saved session from the store dir or log in with the password.
    pub async fn connect(login: MatrixLogin) -> Result<Self, String> {
        let homeserver = reqwest::Url::parse(login.homeserver.trim())
            .map_err(|e| format!("invalid homeserver url {:?}: {}", login.homeserver, e))?;
        tokio::fs::create_dir_all(&login.store_dir)
            .await
            .map_err(|e| format!("creating {}: {}", login.store_dir.display(), e))?;

        let client = Client::builder()
            .homeserver_url(homeserver.as_str())
            .sqlite_store(&login.store_dir, None)
            .build()
            .await
            .map_err(|e| format!("building matrix client: {}", e))?;

        let session_path = login.store_dir.join(SESSION_FILE);
        match load_session(&session_path).await {
            Some(saved) if saved.homeserver == homeserver.as_str() => {
                client
                    .restore_session(saved.session)
                    .await
                    .map_err(|e| format!("restoring matrix session: {}", e))?;
                log::info!("matrix: restored session from {}", session_path.display());
            }
            _ => {
                let password = login
                    .password
                    .as_deref()
                    .ok_or("matrix password not configured and no saved session")?;
                let device_name = login
                    .device_name
                    .as_deref()
                    .unwrap_or(DEFAULT_DEVICE_NAME);
                client
                    .matrix_auth()
                    .login_username(&login.user_id, password)
                    .initial_device_display_name(device_name)
                    .await
                    .map_err(|e| format!("matrix login failed: {}", e))?;
                log::info!("matrix: logged in as {}", login.user_id);
                if let Some(session) = client.matrix_auth().session() {
                    let saved = SavedSession {
                        homeserver: homeserver.to_string(),
                        session,
                    };
                    if let Err(e) = save_session(&session_path, &saved).await {
                        log::warn!("matrix: could not save session: {}", e);
                    }
                }
            }
        }

        let user_id = client
            .user_id()
            .map(|u| u.to_string())
            .ok_or("matrix client has no user id after login")?;
        Ok(Self { client, user_id })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Skip the backlog with one sync, then keep syncing and forward messages from joined rooms.
    pub async fn start_inbound(
        &self,
        inbound_tx: mpsc::Sender<MatrixMessage>,
    ) -> Result<JoinHandle<()>, String> {
        let response = self
            .client
            .sync_once(SyncSettings::default())
            .await
            .map_err(|e| format!("initial sync failed: {}", e))?;

        self.client
            .add_event_handler(move |ev: OriginalSyncRoomMessageEvent, room: Room| {
                let tx = inbound_tx.clone();
                async move {
                    if room.state() != RoomState::Joined {
                        return;
                    }
                    let sender_display_name = room
                        .get_member_no_sync(&ev.sender)
                        .await
                        .ok()
                        .flatten()
                        .and_then(|m| m.display_name().map(str::to_owned));
                    let msg = MatrixMessage {
                        sender: ev.sender.to_string(),
                        sender_display_name,
                        room_id: room.room_id().to_string(),
                        event_id: ev.event_id.to_string(),
                        msgtype: ev.content.msgtype().to_string(),
                        body: ev.content.body().to_string(),
                        origin_server_ts: ev.origin_server_ts.0.into(),
                    };
                    if tx.send(msg).await.is_err() {
                        log::debug!("matrix: inbound channel closed, dropping message");
                    }
                }
            });

        let client = self.client.clone();
        let settings = SyncSettings::default().token(response.next_batch);
        log::info!("matrix channel: starting sync loop");
        Ok(tokio::spawn(async move {
            if let Err(e) = client.sync(settings).await {
                log::error!("matrix sync loop stopped: {}", e);
            }
        }))
    }

    fn room(&self, room_id: &str) -> Result<Room, String> {
        let id = RoomId::parse(room_id).map_err(|e| format!("invalid room id {}: {}", room_id, e))?;
        self.client
            .get_room(&id)
            .ok_or_else(|| format!("unknown room {}", room_id))
    }

    /// Joined members of a room; fetches the member list from the server if it is not cached.
    pub async fn joined_member_count(&self, room_id: &str) -> Result<u64, String> {
        let room = self.room(room_id)?;
        let members = room
            .members(RoomMemberships::JOIN)
            .await
            .map_err(|e| e.to_string())?;
        Ok(members.len() as u64)
    }

    /// The SDK refreshes the notice itself while typing is on, so no timeout is passed through.
    pub async fn set_typing(&self, room_id: &str, typing: bool) -> Result<(), String> {
        self.room(room_id)?
            .typing_notice(typing)
            .await
            .map_err(|e| e.to_string())
    }

    pub async fn mark_read(&self, room_id: &str, event_id: &str) -> Result<(), String> {
        let event_id = EventId::parse(event_id).map_err(|e| e.to_string())?;
        self.room(room_id)?
            .send_single_receipt(ReceiptType::Read, ReceiptThread::Unthreaded, event_id)
            .await
            .map_err(|e| e.to_string())
    }

    pub async fn send_text(&self, room_id: &str, text: &str) -> Result<(), String> {
        self.room(room_id)?
            .send(notice(text, None))
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    pub async fn send_reply(&self, room_id: &str, event_id: &str, text: &str) -> Result<(), String> {
        let event_id = EventId::parse(event_id).map_err(|e| e.to_string())?;
        self.room(room_id)?
            .send(notice(text, Some(event_id)))
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Relay output goes out as `m.notice`, which other bots (and this relay) do not answer.
fn notice(text: &str, in_reply_to: Option<OwnedEventId>) -> RoomMessageEventContent {
    let mut content = RoomMessageEventContent::notice_plain(text);
    if let Some(event_id) = in_reply_to {
        content.relates_to = Some(Relation::Reply {
            in_reply_to: InReplyTo::new(event_id),
        });
    }
    content
}

async fn load_session(path: &Path) -> Option<SavedSession> {
    let s = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str(&s) {
        Ok(saved) => Some(saved),
        Err(e) => {
            log::warn!("matrix: ignoring unreadable session file {}: {}", path.display(), e);
            None
        }
    }
}

async fn save_session(path: &Path, saved: &SavedSession) -> Result<(), String> {
    let s = serde_json::to_string(saved).map_err(|e| e.to_string())?;
    tokio::fs::write(path, s).await.map_err(|e| e.to_string())
}
