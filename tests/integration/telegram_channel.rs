//! Telegram adapter and notifier against a mock Bot API.

use std::sync::Arc;
use std::time::Duration;

use gradewatch::UserKey;
use gradewatch::channels::{
    ChannelAdapter, ChannelNotifier, ChannelOutboundMessage, Notifier, RateLimits,
    TelegramAdapter, TransportError,
};
use gradewatch::config::TelegramConfig;
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123:abc";

fn adapter(server: &MockServer) -> TelegramAdapter {
    let config = TelegramConfig {
        api_base: server.uri(),
        poll_timeout_secs: 1,
        ..TelegramConfig::default()
    };
    TelegramAdapter::new(&config, TOKEN.to_owned()).unwrap()
}

fn sent_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "ok": true,
        "result": { "message_id": 1, "chat": { "id": 42 }, "date": 0 }
    }))
}

#[tokio::test]
async fn notifier_sends_to_the_user_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_partial_json(json!({ "chat_id": "42", "text": "hello" })))
        .respond_with(sent_ok())
        .expect(1)
        .mount(&server)
        .await;

    let notifier = ChannelNotifier::new(Arc::new(adapter(&server)), RateLimits::default());
    notifier.notify(UserKey(42), "hello").await.unwrap();
}

#[tokio::test]
async fn per_chat_limit_is_reported_when_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(sent_ok())
        .expect(2)
        .mount(&server)
        .await;

    let limits = RateLimits {
        max_messages_per_minute: 100,
        max_messages_per_chat_per_minute: 2,
    };
    let notifier = ChannelNotifier::new(Arc::new(adapter(&server)), limits)
        .with_max_queue_wait(Duration::ZERO);

    notifier.notify(UserKey(42), "one").await.unwrap();
    notifier.notify(UserKey(42), "two").await.unwrap();
    let err = notifier.notify(UserKey(42), "three").await.unwrap_err();
    assert!(matches!(err, TransportError::RateLimited { .. }));
}

#[tokio::test]
async fn flood_control_is_retried_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 1",
            "parameters": { "retry_after": 1 }
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(sent_ok())
        .expect(1)
        .mount(&server)
        .await;

    adapter(&server)
        .send(ChannelOutboundMessage {
            reply_target: "42".to_owned(),
            text: "retry me".to_owned(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn api_errors_do_not_leak_the_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        })))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .send(ChannelOutboundMessage {
            reply_target: "42".to_owned(),
            text: "hi".to_owned(),
        })
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("blocked"));
    assert!(!message.contains(TOKEN));
}

#[tokio::test]
async fn long_poll_forwards_text_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(body_partial_json(json!({ "offset": 0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": [
                { "update_id": 7, "message": {
                    "message_id": 1, "chat": { "id": 42, "type": "private" },
                    "from": { "id": 42, "is_bot": false, "first_name": "A" },
                    "text": "/start" } },
                { "update_id": 8, "message": {
                    "message_id": 2, "chat": { "id": 42, "type": "private" } } }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(body_partial_json(json!({ "offset": 9 })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "ok": true, "result": [] }))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let adapter = Arc::new(adapter(&server));
    let (tx, mut rx) = mpsc::channel(8);
    let poller = tokio::spawn({
        let adapter = Arc::clone(&adapter);
        async move { adapter.run(tx).await }
    });

    let inbound = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inbound.channel, "telegram");
    assert_eq!(inbound.reply_target, "42");
    assert_eq!(inbound.text, "/start");
    assert!(
        tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .is_err()
    );

    poller.abort();
}

#[tokio::test]
async fn restart_after_failed_poll_does_not_redeliver() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(body_partial_json(json!({ "offset": 0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": [
                { "update_id": 7, "message": {
                    "message_id": 1, "chat": { "id": 42, "type": "private" },
                    "text": "/get" } }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(body_partial_json(json!({ "offset": 8 })))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(body_partial_json(json!({ "offset": 8 })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "ok": true, "result": [] }))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let adapter = Arc::new(adapter(&server));
    let (tx, mut rx) = mpsc::channel(8);

    assert!(adapter.run(tx.clone()).await.is_err());
    let poller = tokio::spawn({
        let adapter = Arc::clone(&adapter);
        async move { adapter.run(tx).await }
    });
    tokio::time::sleep(Duration::from_millis(500)).await;
    poller.abort();

    let mut texts = Vec::new();
    while let Ok(inbound) = rx.try_recv() {
        texts.push(inbound.text);
    }
    assert_eq!(texts, vec!["/get".to_owned()]);
}

#[tokio::test]
async fn health_check_uses_get_me() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getMe")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "id": 1, "is_bot": true, "first_name": "Grades" }
        })))
        .mount(&server)
        .await;

    assert!(adapter(&server).health_check().await.unwrap());
}
