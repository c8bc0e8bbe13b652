//! Delivery pipeline against a local webhook: status classification, error replies, typing order.

mod common;

use axum::http::{Method, StatusCode};
use common::{spawn_webhook, unreachable_url, Call, RecordingClient};
use lib::channels::ChatClient;
use lib::config::WebhookMethod;
use lib::delivery::deliver;
use lib::trigger::{Activation, Mechanism};
use lib::webhook::{DeliveryError, WebhookClient};
use std::sync::Arc;
use std::time::Duration;

fn activation(text: &str) -> Activation {
    Activation {
        mechanism: Mechanism::Prefix,
        forwarded_text: text.to_string(),
    }
}

fn chat(client: &Arc<RecordingClient>) -> Arc<dyn ChatClient> {
    client.clone()
}

#[tokio::test]
async fn ok_response_posts_envelope_and_stays_silent() {
    let hook = spawn_webhook(StatusCode::OK, Duration::ZERO).await;
    let client = RecordingClient::new(5);
    let s = common::settings(&hook.url, |_| {});
    let mut ev = common::message("@alice:example.org", "$e1", "!go hello");
    ev.sender_display_name = Some("Alice".to_string());

    let res = deliver(&activation("hello"), &ev, &s, chat(&client), &WebhookClient::new().unwrap()).await;

    assert!(res.is_ok(), "{:?}", res);
    assert!(client.messages().is_empty());
    assert_eq!(client.calls(), vec![Call::Typing(true), Call::Typing(false)]);
    let envs = hook.envelopes();
    assert_eq!(envs.len(), 1);
    assert_eq!(envs[0].message, "hello");
    assert_eq!(envs[0].sender, "@alice:example.org");
    assert_eq!(envs[0].sender_display_name, "Alice");
    assert_eq!(envs[0].room_id, common::ROOM);
    assert_eq!(envs[0].event_id, "$e1");
    assert_eq!(envs[0].timestamp, 1_700_000_000_000);
    assert_eq!(hook.methods(), vec![Method::POST]);
}

#[tokio::test]
async fn server_error_is_reported_once_with_status() {
    let hook = spawn_webhook(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await;
    let client = RecordingClient::new(5);
    let s = common::settings(&hook.url, |_| {});
    let ev = common::message("@alice:example.org", "$e2", "!go hi");

    let res = deliver(&activation("hi"), &ev, &s, chat(&client), &WebhookClient::new().unwrap()).await;

    match res {
        Err(DeliveryError::RemoteRejected { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected RemoteRejected, got {:?}", other),
    }
    let msgs = client.messages();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].contains("500"));
    let calls = client.calls();
    assert!(matches!(&calls[1], Call::Reply(id, _) if id == "$e2"));
    assert_eq!(calls.last(), Some(&Call::Typing(false)));
}

#[tokio::test]
async fn only_200_counts_as_delivered() {
    let hook = spawn_webhook(StatusCode::ACCEPTED, Duration::ZERO).await;
    let client = RecordingClient::new(5);
    let s = common::settings(&hook.url, |r| r.send_typing = false);
    let ev = common::message("@alice:example.org", "$e3", "!go hi");

    let res = deliver(&activation("hi"), &ev, &s, chat(&client), &WebhookClient::new().unwrap()).await;

    assert!(matches!(res, Err(DeliveryError::RemoteRejected { status: 202, .. })));
    assert_eq!(client.messages().len(), 1);
    assert!(client.messages()[0].contains("202"));
}

#[tokio::test]
async fn connection_failure_reports_unreachable() {
    let client = RecordingClient::new(5);
    let s = common::settings(&unreachable_url(), |_| {});
    let ev = common::message("@alice:example.org", "$e4", "!go hi");

    let res = deliver(&activation("hi"), &ev, &s, chat(&client), &WebhookClient::new().unwrap()).await;

    assert!(matches!(res, Err(DeliveryError::Transport(_))), "{:?}", res);
    let msgs = client.messages();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].contains("unable to reach"));
    assert_eq!(client.typing(), vec![true, false]);
}

#[tokio::test]
async fn timeout_is_a_transport_error_and_typing_still_stops() {
    let hook = spawn_webhook(StatusCode::OK, Duration::from_secs(3)).await;
    let client = RecordingClient::new(5);
    let s = common::settings(&hook.url, |_| {});
    let ev = common::message("@alice:example.org", "$e5", "!go slow");
    let webhook = WebhookClient::with_timeout(Duration::from_millis(200)).unwrap();

    let res = deliver(&activation("slow"), &ev, &s, chat(&client), &webhook).await;

    match res {
        Err(DeliveryError::Transport(e)) => assert!(e.is_timeout(), "{:?}", e),
        other => panic!("expected Transport timeout, got {:?}", other),
    }
    assert_eq!(client.messages().len(), 1);
    let calls = client.calls();
    assert_eq!(calls.first(), Some(&Call::Typing(true)));
    assert_eq!(calls.last(), Some(&Call::Typing(false)));
    assert_eq!(client.typing(), vec![true, false]);
}

#[tokio::test]
async fn cancelled_delivery_still_stops_typing() {
    let hook = spawn_webhook(StatusCode::OK, Duration::from_secs(5)).await;
    let client = RecordingClient::new(5);
    let s = common::settings(&hook.url, |_| {});
    let ev = common::message("@alice:example.org", "$e6", "!go slow");
    let webhook = WebhookClient::new().unwrap();

    let res = tokio::time::timeout(
        Duration::from_millis(300),
        deliver(&activation("slow"), &ev, &s, chat(&client), &webhook),
    )
    .await;
    assert!(res.is_err(), "delivery should still be pending");

    assert!(common::eventually(|| client.typing() == vec![true, false]).await);
    assert!(client.messages().is_empty());
}

#[tokio::test]
async fn typing_disabled_sends_no_typing() {
    let hook = spawn_webhook(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await;
    let client = RecordingClient::new(5);
    let s = common::settings(&hook.url, |r| r.send_typing = false);
    let ev = common::message("@alice:example.org", "$e7", "!go hi");

    let _ = deliver(&activation("hi"), &ev, &s, chat(&client), &WebhookClient::new().unwrap()).await;

    assert!(client.typing().is_empty());
    assert_eq!(client.messages().len(), 1);
}

#[tokio::test]
async fn typing_failures_do_not_block_delivery() {
    let hook = spawn_webhook(StatusCode::OK, Duration::ZERO).await;
    let client = RecordingClient::with_failing_typing(5);
    let s = common::settings(&hook.url, |_| {});
    let ev = common::message("@alice:example.org", "$e8", "!go hi");

    let res = deliver(&activation("hi"), &ev, &s, chat(&client), &WebhookClient::new().unwrap()).await;

    assert!(res.is_ok());
    assert_eq!(hook.envelopes().len(), 1);
    assert_eq!(client.typing(), vec![true, false]);
    assert!(client.messages().is_empty());
}

#[tokio::test]
async fn get_method_sends_json_body_on_get() {
    let hook = spawn_webhook(StatusCode::OK, Duration::ZERO).await;
    let client = RecordingClient::new(5);
    let s = common::settings(&hook.url, |r| r.webhook_method = WebhookMethod::Get);
    let ev = common::message("@alice:example.org", "$e9", "!go hi");

    let res = deliver(&activation("hi"), &ev, &s, chat(&client), &WebhookClient::new().unwrap()).await;

    assert!(res.is_ok());
    assert_eq!(hook.methods(), vec![Method::GET]);
    assert_eq!(hook.envelopes()[0].message, "hi");
}
