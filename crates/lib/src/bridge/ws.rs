//! WebSocket implementation of the bridge.
//!
//! One connection to the backend. Requests go out as
//! `{"type":"req","id","method","params"}` frames; `{"type":"res"}` frames
//! are correlated back to the pending request by id, and `{"type":"event"}`
//! frames are routed onto the push channel for the sync controller.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{Bridge, BridgeError, PushEvent};
use crate::protocol::{BridgeEventFrame, BridgeRequest, BridgeResponse};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<BridgeResponse>>>>;

/// WebSocket client for the backend bridge.
pub struct WsBridge {
    writer: Mutex<WsSink>,
    pending: PendingMap,
}

impl WsBridge {
    /// Connect to `ws://{host}:{port}/bridge` and start the reader task.
    /// Push events are delivered on `push_tx` until the connection closes;
    /// when it does, every pending call fails with `Closed`.
    pub async fn connect(
        host: &str,
        port: u16,
        push_tx: mpsc::Sender<PushEvent>,
    ) -> Result<Self, BridgeError> {
        let url = format!("ws://{}:{}/bridge", host.trim(), port);
        let (ws, _) = connect_async(&url)
            .await
            .map_err(|e| BridgeError::Connect(format!("{}: {}", url, e)))?;
        let (writer, reader) = ws.split();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(read_loop(reader, pending.clone(), push_tx));
        Ok(Self {
            writer: Mutex::new(writer),
            pending,
        })
    }

    async fn write_frame(&self, request: &BridgeRequest) -> Result<(), BridgeError> {
        let frame =
            serde_json::to_string(request).map_err(|e| BridgeError::Transport(e.to_string()))?;
        self.writer
            .lock()
            .await
            .send(WsMessage::Text(frame))
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))
    }

    /// Send one request and await its response frame.
    async fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        let request = BridgeRequest::new(id.clone(), method, params);
        if let Err(e) = self.write_frame(&request).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let response = rx.await.map_err(|_| BridgeError::Closed)?;
        if !response.ok {
            return Err(BridgeError::Backend(
                response
                    .error
                    .unwrap_or_else(|| format!("{} failed", method)),
            ));
        }
        Ok(response.payload.unwrap_or(Value::Null))
    }

    /// Send one request without waiting for a response (the backend does
    /// not acknowledge fire-and-forget methods).
    async fn notify(&self, method: &str, params: Value) -> Result<(), BridgeError> {
        let request = BridgeRequest::new(uuid::Uuid::new_v4().to_string(), method, params);
        self.write_frame(&request).await
    }
}

/// Res payloads for the identity calls are plain JSON strings.
fn string_payload(value: Value) -> Result<String, BridgeError> {
    value
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| BridgeError::Malformed(format!("expected string payload, got {}", value)))
}

async fn read_loop(mut reader: WsSource, pending: PendingMap, push_tx: mpsc::Sender<PushEvent>) {
    while let Some(frame) = reader.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("bridge read error: {}", e);
                break;
            }
        };
        let WsMessage::Text(text) = frame else { continue };
        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("dropping unparseable bridge frame: {}", e);
                continue;
            }
        };
        let typ = value
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        match typ.as_str() {
            "res" => {
                let response: BridgeResponse = match serde_json::from_value(value) {
                    Ok(response) => response,
                    Err(e) => {
                        log::warn!("dropping malformed res frame: {}", e);
                        continue;
                    }
                };
                match pending.lock().await.remove(&response.id) {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => log::debug!("response for unknown request id {}", response.id),
                }
            }
            "event" => {
                let frame: BridgeEventFrame = match serde_json::from_value(value) {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::warn!("dropping malformed event frame: {}", e);
                        continue;
                    }
                };
                let push = match frame.event.as_str() {
                    "incomingMessage" => PushEvent::IncomingMessage(frame.payload),
                    "addContactResponse" => PushEvent::AddContactResponse(frame.payload),
                    other => {
                        log::debug!("ignoring bridge event {:?}", other);
                        continue;
                    }
                };
                if push_tx.send(push).await.is_err() {
                    // Engine gone; no consumer left for this connection.
                    break;
                }
            }
            other => log::debug!("ignoring bridge frame type {:?}", other),
        }
    }

    // Connection gone: dropping the senders fails every pending call.
    pending.lock().await.clear();
    log::info!("bridge connection closed");
}

#[async_trait::async_trait]
impl Bridge for WsBridge {
    async fn get_identity(&self) -> Result<String, BridgeError> {
        string_payload(self.call("getIdentity", json!({})).await?)
    }

    async fn get_display_name(&self) -> Result<String, BridgeError> {
        string_payload(self.call("getDisplayName", json!({})).await?)
    }

    async fn load_contact_overview(&self) -> Result<Value, BridgeError> {
        self.call("loadContactOverview", json!({})).await
    }

    async fn load_chat_history(&self) -> Result<Value, BridgeError> {
        self.call("loadChatHistory", json!({})).await
    }

    async fn request_contact_connection(&self, uuid: &str) -> Result<(), BridgeError> {
        self.notify("requestContactConnection", json!({ "uuid": uuid }))
            .await
    }

    async fn send_message(&self, contact_id: &str, body: &str) -> Result<(), BridgeError> {
        self.notify("sendMessage", json!({ "contactId": contact_id, "body": body }))
            .await
    }
}
