//! End-to-end tests driving the relay through a real WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use parley_core::UserId;
use parley_relay::{register_all, EventRegistry, RelayContext};
use parley_server::{ParleyServer, ServerConfig};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Boot a test server with seeded users and return the WS URL + handle.
async fn boot_server() -> (String, Arc<ParleyServer>) {
    let store = parley_store::in_memory_store().unwrap();
    let _ = store.create_user(&UserId::from("alice"), "alice").unwrap();
    let _ = store.create_user(&UserId::from("bob"), "bob").unwrap();

    let context = Arc::new(RelayContext::new(store));
    let mut registry = EventRegistry::new();
    register_all(&mut registry);

    let config = ServerConfig::default(); // port 0 = auto-assign
    let metrics = PrometheusBuilder::new().build_recorder().handle();
    let server = Arc::new(ParleyServer::new(config, context, registry, metrics));

    let (addr, _handle) = server.listen().await.unwrap();
    (format!("ws://{addr}/ws"), server)
}

/// Connect and consume the `connection.established` hello frame.
async fn connect(url: &str) -> WsStream {
    let (mut ws, _) = connect_async(url).await.unwrap();
    let hello = read_json(&mut ws).await;
    assert_eq!(hello["type"], "connection.established");
    ws
}

/// Read the next text frame as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Try to read a JSON frame within `dur`. Returns `None` on timeout.
async fn try_read_json(ws: &mut WsStream, dur: Duration) -> Option<Value> {
    match timeout(dur, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str::<Value>(&text).ok();
                }
                Some(Ok(_)) => {}
                _ => return None,
            }
        }
    })
    .await
    {
        Ok(val) => val,
        Err(_) => None,
    }
}

/// Read until an event of the given type arrives.
async fn read_until_event_type(ws: &mut WsStream, event_type: &str) -> Option<Value> {
    let deadline = Duration::from_secs(3);
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        let remaining = deadline.saturating_sub(start.elapsed());
        if let Some(msg) = try_read_json(ws, remaining).await {
            if msg.get("type").and_then(|v| v.as_str()) == Some(event_type) {
                return Some(msg);
            }
        } else {
            break;
        }
    }
    None
}

/// Emit a client event frame.
async fn emit(ws: &mut WsStream, event: &str, data: Value) {
    let frame = json!({"type": event, "data": data});
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

/// Wait until every frame emitted so far on this connection has been
/// processed. Frames are handled sequentially per connection, so a reply
/// to `getOnlineUsers` proves earlier events (e.g. `join`) took effect.
async fn settled(ws: &mut WsStream) {
    emit(ws, "getOnlineUsers", Value::Null).await;
    let _ = read_until_event_type(ws, "onlineUsers")
        .await
        .expect("barrier reply");
}

/// Create (or fetch) the alice/bob conversation through the pipeline.
async fn alice_bob_conversation(server: &ParleyServer) -> String {
    server
        .context()
        .pipeline
        .get_or_create_conversation(&UserId::from("alice"), &UserId::from("bob"))
        .await
        .unwrap()
        .id
        .into_inner()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_hello_frame_on_connect() {
    let (url, server) = boot_server().await;
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    let hello = read_json(&mut ws).await;
    assert_eq!(hello["type"], "connection.established");
    assert!(hello["data"]["connectionId"].is_string());
    assert!(hello["timestamp"].is_string());

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_login_broadcasts_user_online() {
    let (url, server) = boot_server().await;
    let mut watcher = connect(&url).await;
    let mut ws = connect(&url).await;

    emit(&mut ws, "login", json!("alice")).await;

    let evt = read_until_event_type(&mut watcher, "user:online").await;
    assert_eq!(evt.unwrap()["data"], "alice");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_online_users_snapshot() {
    let (url, server) = boot_server().await;
    let mut alice = connect(&url).await;
    emit(&mut alice, "login", json!("alice")).await;
    // Wait for the broadcast so presence is settled.
    let _ = read_until_event_type(&mut alice, "user:online").await;

    let mut bob = connect(&url).await;
    emit(&mut bob, "getOnlineUsers", Value::Null).await;
    let snapshot = read_until_event_type(&mut bob, "onlineUsers").await.unwrap();
    assert_eq!(snapshot["data"], json!(["alice"]));

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_message_roundtrip() {
    let (url, server) = boot_server().await;
    let conv = alice_bob_conversation(&server).await;

    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;
    emit(&mut alice, "login", json!("alice")).await;
    emit(&mut bob, "login", json!("bob")).await;
    emit(&mut alice, "join", json!(conv.clone())).await;
    emit(&mut bob, "join", json!(conv.clone())).await;
    settled(&mut bob).await;

    emit(
        &mut alice,
        "message:send",
        json!({"conversationId": conv, "senderId": "alice", "content": "hi"}),
    )
    .await;

    // Both the peer and the sender's own connection receive message:new.
    let to_bob = read_until_event_type(&mut bob, "message:new").await.unwrap();
    assert_eq!(to_bob["data"]["content"], "hi");
    assert_eq!(to_bob["data"]["senderId"], "alice");
    assert_eq!(to_bob["data"]["senderUsername"], "alice");
    assert!(to_bob["data"]["id"].is_string());
    assert!(to_bob["data"]["createdAt"].is_string());

    let to_alice = read_until_event_type(&mut alice, "message:new").await.unwrap();
    assert_eq!(to_alice["data"]["id"], to_bob["data"]["id"]);

    // The broadcast message is durably readable.
    let history = server
        .context()
        .pipeline
        .fetch_history(&parley_core::ConversationId::from(conv.as_str()))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "hi");
    assert_eq!(history[0].sender_username, "alice");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_empty_message_rejected_with_error_event() {
    let (url, server) = boot_server().await;
    let conv = alice_bob_conversation(&server).await;

    let mut alice = connect(&url).await;
    emit(&mut alice, "login", json!("alice")).await;
    emit(&mut alice, "join", json!(conv.clone())).await;

    emit(
        &mut alice,
        "message:send",
        json!({"conversationId": conv, "senderId": "alice", "content": "   "}),
    )
    .await;

    let err = read_until_event_type(&mut alice, "error").await.unwrap();
    assert_eq!(err["data"]["code"], "INVALID_ARGUMENT");

    let history = server
        .context()
        .pipeline
        .fetch_history(&parley_core::ConversationId::from(conv.as_str()))
        .await
        .unwrap();
    assert!(history.is_empty(), "nothing persisted");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_disconnect_without_logout_emits_offline_once() {
    let (url, server) = boot_server().await;
    let mut watcher = connect(&url).await;

    let mut alice = connect(&url).await;
    emit(&mut alice, "login", json!("alice")).await;
    let _ = read_until_event_type(&mut watcher, "user:online").await.unwrap();

    // Tab close, no logout event.
    drop(alice);

    let offline = read_until_event_type(&mut watcher, "user:offline").await;
    assert_eq!(offline.unwrap()["data"], "alice");

    // Exactly once: nothing further arrives.
    let extra = try_read_json(&mut watcher, Duration::from_millis(300)).await;
    assert!(extra.is_none(), "unexpected extra event: {extra:?}");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_multi_tab_user_stays_online() {
    let (url, server) = boot_server().await;
    let mut watcher = connect(&url).await;

    let mut tab1 = connect(&url).await;
    let mut tab2 = connect(&url).await;
    emit(&mut tab1, "login", json!("alice")).await;
    let _ = read_until_event_type(&mut watcher, "user:online").await.unwrap();
    emit(&mut tab2, "login", json!("alice")).await;
    settled(&mut tab2).await;

    // Sign out one tab; the other keeps alice online.
    emit(&mut tab1, "logout", json!("alice")).await;
    let premature = read_until_event_type(&mut watcher, "user:offline").await;
    assert!(premature.is_none(), "offline fired with a live session left");

    drop(tab2);
    let offline = read_until_event_type(&mut watcher, "user:offline").await;
    assert_eq!(offline.unwrap()["data"], "alice");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_typing_indicator_excludes_origin() {
    let (url, server) = boot_server().await;
    let conv = alice_bob_conversation(&server).await;

    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;
    emit(&mut alice, "join", json!(conv.clone())).await;
    emit(&mut bob, "join", json!(conv.clone())).await;
    settled(&mut bob).await;

    emit(
        &mut alice,
        "typing:start",
        json!({"conversationId": conv, "username": "alice"}),
    )
    .await;
    let start = read_until_event_type(&mut bob, "typing:start").await.unwrap();
    assert_eq!(start["data"], "alice");

    emit(&mut alice, "typing:stop", json!({"conversationId": conv})).await;
    let stop = read_until_event_type(&mut bob, "typing:stop").await.unwrap();
    assert!(stop.get("data").is_none());

    // The originator never sees its own indicator.
    let echo = try_read_json(&mut alice, Duration::from_millis(300)).await;
    assert!(echo.is_none(), "origin received its own typing event: {echo:?}");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_messages_scoped_to_room() {
    let (url, server) = boot_server().await;
    let conv = alice_bob_conversation(&server).await;

    let mut member = connect(&url).await;
    let mut outsider = connect(&url).await;
    emit(&mut member, "join", json!(conv.clone())).await;
    // Outsider never joins.

    emit(
        &mut member,
        "message:send",
        json!({"conversationId": conv, "senderId": "alice", "content": "private"}),
    )
    .await;

    let seen = read_until_event_type(&mut member, "message:new").await;
    assert!(seen.is_some());
    let leaked = try_read_json(&mut outsider, Duration::from_millis(300)).await;
    assert!(leaked.is_none(), "outsider received room traffic: {leaked:?}");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_unknown_event_reports_error() {
    let (url, server) = boot_server().await;
    let mut ws = connect(&url).await;

    ws.send(Message::text(r#"{"type": "no.such.event"}"#))
        .await
        .unwrap();
    let err = read_until_event_type(&mut ws, "error").await.unwrap();
    assert_eq!(err["data"]["code"], "UNKNOWN_EVENT");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_invalid_json_reports_error() {
    let (url, server) = boot_server().await;
    let mut ws = connect(&url).await;

    ws.send(Message::text("not json at all")).await.unwrap();
    let err = read_until_event_type(&mut ws, "error").await.unwrap();
    assert_eq!(err["data"]["code"], "INVALID_ARGUMENT");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_message_order_preserved() {
    let (url, server) = boot_server().await;
    let conv = alice_bob_conversation(&server).await;

    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;
    emit(&mut alice, "join", json!(conv.clone())).await;
    emit(&mut bob, "join", json!(conv.clone())).await;
    settled(&mut bob).await;

    for i in 0..10 {
        emit(
            &mut alice,
            "message:send",
            json!({"conversationId": conv, "senderId": "alice", "content": format!("m{i}")}),
        )
        .await;
    }

    for i in 0..10 {
        let msg = read_until_event_type(&mut bob, "message:new").await.unwrap();
        assert_eq!(msg["data"]["content"], format!("m{i}"), "message {i} out of order");
    }

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_two_conversations_are_isolated() {
    let (url, server) = boot_server().await;
    let _ = server
        .context()
        .store
        .create_user(&UserId::from("carol"), "carol")
        .unwrap();
    let conv_ab = alice_bob_conversation(&server).await;
    let conv_ac = server
        .context()
        .pipeline
        .get_or_create_conversation(&UserId::from("alice"), &UserId::from("carol"))
        .await
        .unwrap()
        .id
        .into_inner();

    let mut bob = connect(&url).await;
    let mut carol = connect(&url).await;
    emit(&mut bob, "join", json!(conv_ab.clone())).await;
    emit(&mut carol, "join", json!(conv_ac.clone())).await;
    settled(&mut bob).await;
    settled(&mut carol).await;

    let mut alice = connect(&url).await;
    emit(&mut alice, "join", json!(conv_ab.clone())).await;
    emit(
        &mut alice,
        "message:send",
        json!({"conversationId": conv_ab, "senderId": "alice", "content": "for bob"}),
    )
    .await;

    let to_bob = read_until_event_type(&mut bob, "message:new").await.unwrap();
    assert_eq!(to_bob["data"]["content"], "for bob");
    let to_carol = try_read_json(&mut carol, Duration::from_millis(300)).await;
    assert!(to_carol.is_none());

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_graceful_shutdown_closes_connections() {
    let (url, server) = boot_server().await;
    let mut ws = connect(&url).await;

    server.shutdown().shutdown();

    let result = timeout(Duration::from_secs(3), async {
        while let Some(msg) = ws.next().await {
            match msg {
                Err(_) | Ok(Message::Close(_)) => break,
                _ => {}
            }
        }
    })
    .await;
    let _ = result;
}
