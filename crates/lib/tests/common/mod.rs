//! Shared fixtures: a recording chat client and a local axum server standing in for the workflow webhook.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::routing::any;
use axum::Router;
use lib::channels::{ChatClient, InboundEvent, RoomMembers};
use lib::config::{RelayConfig, RelaySettings};
use lib::webhook::Envelope;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BOT: &str = "@bot:example.org";
pub const ROOM: &str = "!room:example.org";

/// One call made by the relay into the chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Typing(bool),
    Read(String),
    Text(String),
    Reply(String, String),
}

pub struct RecordingClient {
    pub members: Result<u64, String>,
    pub fail_typing: bool,
    calls: Mutex<Vec<Call>>,
}

impl RecordingClient {
    pub fn new(members: u64) -> Arc<Self> {
        Arc::new(Self {
            members: Ok(members),
            fail_typing: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn with_failing_typing(members: u64) -> Arc<Self> {
        Arc::new(Self {
            members: Ok(members),
            fail_typing: true,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Texts sent to rooms, as plain messages or replies.
    pub fn messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Text(t) | Call::Reply(_, t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn typing(&self) -> Vec<bool> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Typing(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RoomMembers for RecordingClient {
    async fn joined_member_count(&self, _room_id: &str) -> Result<u64, String> {
        self.members.clone()
    }
}

#[async_trait]
impl ChatClient for RecordingClient {
    fn user_id(&self) -> &str {
        BOT
    }

    async fn send_typing(&self, _room_id: &str, typing: bool, _timeout_ms: u64) -> Result<(), String> {
        self.record(Call::Typing(typing));
        if self.fail_typing {
            Err("M_LIMIT_EXCEEDED".to_string())
        } else {
            Ok(())
        }
    }

    async fn mark_read(&self, _room_id: &str, event_id: &str) -> Result<(), String> {
        self.record(Call::Read(event_id.to_string()));
        Ok(())
    }

    async fn send_text(&self, _room_id: &str, text: &str) -> Result<(), String> {
        self.record(Call::Text(text.to_string()));
        Ok(())
    }

    async fn reply_to(&self, _room_id: &str, event_id: &str, text: &str) -> Result<(), String> {
        self.record(Call::Reply(event_id.to_string(), text.to_string()));
        Ok(())
    }
}

struct HookState {
    status: StatusCode,
    delay: Duration,
    received: Arc<Mutex<Vec<(Method, Envelope)>>>,
}

/// Running mock webhook. `received` is filled as requests arrive (before any configured delay).
pub struct MockWebhook {
    pub url: String,
    pub received: Arc<Mutex<Vec<(Method, Envelope)>>>,
}

impl MockWebhook {
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.received.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn methods(&self) -> Vec<Method> {
        self.received.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }
}

async fn hook(State(state): State<Arc<HookState>>, method: Method, body: Bytes) -> (StatusCode, String) {
    let envelope: Envelope = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => return (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    };
    state.received.lock().unwrap().push((method, envelope));
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    let body = if state.status.is_success() { "ok" } else { "boom" };
    (state.status, body.to_string())
}

/// Start a webhook on 127.0.0.1 that answers every request with `status` after `delay`.
pub async fn spawn_webhook(status: StatusCode, delay: Duration) -> MockWebhook {
    let received = Arc::new(Mutex::new(Vec::new()));
    let state = Arc::new(HookState {
        status,
        delay,
        received: received.clone(),
    });
    let app = Router::new().route("/hook", any(hook)).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind webhook listener");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    MockWebhook {
        url: format!("http://{}/hook", addr),
        received,
    }
}

/// URL on a port nothing listens on.
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    let port = listener.local_addr().expect("local_addr").port();
    drop(listener);
    format!("http://127.0.0.1:{}/hook", port)
}

/// Settings pointing at `url`, prefix "!go", DM and mention triggers off, typing on.
pub fn settings(url: &str, f: impl FnOnce(&mut RelayConfig)) -> RelaySettings {
    let mut r = RelayConfig {
        webhook_url: Some(url.to_string()),
        trigger_prefix: Some("!go".to_string()),
        trigger_on_dm: false,
        trigger_on_mention: false,
        send_typing: true,
        ..RelayConfig::default()
    };
    f(&mut r);
    r.validate().expect("valid test settings")
}

pub fn message(sender: &str, event_id: &str, body: &str) -> InboundEvent {
    InboundEvent {
        timestamp_ms: 1_700_000_000_000,
        ..InboundEvent::text(sender, ROOM, event_id, body)
    }
}

/// Poll until `cond` holds or 5s pass.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    cond()
}
