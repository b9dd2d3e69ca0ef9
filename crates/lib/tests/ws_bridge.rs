//! Integration test: scripted backend WebSocket server on a free port.
//! Exercises request/response correlation (including out of order),
//! fire-and-forget sends, push-event routing, and backend errors.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use lib::bridge::{Bridge, BridgeError, PushEvent, WsBridge};
use lib::protocol::BridgeResponse;

async fn free_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind free port");
    let port = listener.local_addr().expect("local_addr").port();
    (listener, port)
}

fn res_frame(id: &str, payload: Value) -> WsMessage {
    let response = BridgeResponse::ok(id, payload);
    WsMessage::Text(serde_json::to_string(&response).expect("serialize res"))
}

async fn read_req(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
) -> Value {
    loop {
        let frame = ws.next().await.expect("frame").expect("read");
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(&text).expect("parse req");
        }
    }
}

#[tokio::test]
async fn calls_round_trip_and_events_reach_the_push_channel() {
    let (listener, port) = free_listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");

        let req = read_req(&mut ws).await;
        assert_eq!(req["method"], "getIdentity");
        let id = req["id"].as_str().expect("id").to_string();
        ws.send(res_frame(&id, json!("uuid-1"))).await.expect("respond");

        // Push an event between calls; the client must route it aside.
        ws.send(WsMessage::Text(
            json!({
                "type": "event",
                "event": "incomingMessage",
                "payload": {"senderUUID": "u2", "senderName": "Bob", "message": "yo"},
            })
            .to_string(),
        ))
        .await
        .expect("push event");

        let req = read_req(&mut ws).await;
        assert_eq!(req["method"], "loadContactOverview");
        let id = req["id"].as_str().expect("id").to_string();
        ws.send(res_frame(&id, json!(r#"[{"name":"Alice","uuid":"u1"}]"#)))
            .await
            .expect("respond");

        // Fire-and-forget: the client does not wait, the server does not reply.
        let req = read_req(&mut ws).await;
        assert_eq!(req["method"], "sendMessage");
        assert_eq!(req["params"]["contactId"], "u1");
        assert_eq!(req["params"]["body"], "hello");
    });

    let (push_tx, mut push_rx) = mpsc::channel(8);
    let bridge = WsBridge::connect("127.0.0.1", port, push_tx)
        .await
        .expect("connect");

    assert_eq!(bridge.get_identity().await.expect("identity"), "uuid-1");

    let overview = bridge.load_contact_overview().await.expect("overview");
    assert!(overview.as_str().expect("string payload").contains("Alice"));

    bridge.send_message("u1", "hello").await.expect("send");

    let pushed = tokio::time::timeout(Duration::from_secs(5), push_rx.recv())
        .await
        .expect("push arrives")
        .expect("push");
    match pushed {
        PushEvent::IncomingMessage(payload) => {
            assert_eq!(payload["senderUUID"], "u2");
            assert_eq!(payload["message"], "yo");
        }
        other => panic!("expected incoming message, got {:?}", other),
    }

    server.await.expect("server");
}

#[tokio::test]
async fn out_of_order_responses_are_correlated_by_id() {
    let (listener, port) = free_listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");

        // Collect both requests, then answer them in reverse order.
        let first = read_req(&mut ws).await;
        let second = read_req(&mut ws).await;
        for req in [&second, &first] {
            let id = req["id"].as_str().expect("id").to_string();
            let payload = match req["method"].as_str().expect("method") {
                "getIdentity" => json!("uuid-1"),
                "getDisplayName" => json!("Tester"),
                other => panic!("unexpected method {}", other),
            };
            ws.send(res_frame(&id, payload)).await.expect("respond");
        }
    });

    let (push_tx, _push_rx) = mpsc::channel(8);
    let bridge = WsBridge::connect("127.0.0.1", port, push_tx)
        .await
        .expect("connect");

    let (identity, name) = tokio::join!(bridge.get_identity(), bridge.get_display_name());
    assert_eq!(identity.expect("identity"), "uuid-1");
    assert_eq!(name.expect("name"), "Tester");

    server.await.expect("server");
}

#[tokio::test]
async fn backend_errors_surface_as_bridge_errors() {
    let (listener, port) = free_listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");

        let req = read_req(&mut ws).await;
        let id = req["id"].as_str().expect("id");
        let response = BridgeResponse::err(id, "history unavailable");
        ws.send(WsMessage::Text(
            serde_json::to_string(&response).expect("serialize res"),
        ))
        .await
        .expect("respond");
    });

    let (push_tx, _push_rx) = mpsc::channel(8);
    let bridge = WsBridge::connect("127.0.0.1", port, push_tx)
        .await
        .expect("connect");

    let err = bridge.load_chat_history().await.unwrap_err();
    match err {
        BridgeError::Backend(message) => assert_eq!(message, "history unavailable"),
        other => panic!("expected backend error, got {}", other),
    }

    server.await.expect("server");
}
