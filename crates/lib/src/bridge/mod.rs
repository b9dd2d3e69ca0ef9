//! Bridge to the backend process: request/response calls plus push events.
//!
//! The sync engine depends only on the `Bridge` trait; `WsBridge` is the
//! concrete WebSocket client. Push events (incoming messages and
//! contact-request outcomes) arrive on a channel the bridge fills and the
//! sync controller drains.

mod ws;

pub use ws::WsBridge;

use async_trait::async_trait;
use serde_json::Value;

/// Request/transport failures talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("bridge connect failed: {0}")]
    Connect(String),
    #[error("bridge transport error: {0}")]
    Transport(String),
    #[error("bridge connection closed")]
    Closed,
    #[error("backend error: {0}")]
    Backend(String),
    #[error("malformed bridge payload: {0}")]
    Malformed(String),
}

/// A push event delivered by the backend outside the request/response
/// flow. Payloads stay raw JSON here; the sync controller applies strict
/// parsing so a malformed event is dropped without touching state.
#[derive(Debug, Clone)]
pub enum PushEvent {
    IncomingMessage(Value),
    AddContactResponse(Value),
}

/// Call/response surface of the backend bridge.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Local user uuid.
    async fn get_identity(&self) -> Result<String, BridgeError>;

    /// Local user display name.
    async fn get_display_name(&self) -> Result<String, BridgeError>;

    /// Contact overview snapshot: JSON array of `{ name, uuid }` (possibly
    /// wrapped in a JSON string by the backend's serializer).
    async fn load_contact_overview(&self) -> Result<Value, BridgeError>;

    /// Chat history snapshot: JSON array of `{ contact, sentBy, message,
    /// date }` (possibly wrapped in a JSON string).
    async fn load_chat_history(&self) -> Result<Value, BridgeError>;

    /// Fire-and-forget: ask the backend to connect with a contact. The
    /// outcome arrives later as an `addContactResponse` push event.
    async fn request_contact_connection(&self, uuid: &str) -> Result<(), BridgeError>;

    /// Fire-and-forget: deliver a composed message. No delivery ack is
    /// modeled; errors here are local transport failures only.
    async fn send_message(&self, contact_id: &str, body: &str) -> Result<(), BridgeError>;
}
