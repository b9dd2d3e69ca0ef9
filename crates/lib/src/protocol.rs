//! Bridge WebSocket protocol types (requests, responses, push events).

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::timeline::SentBy;

/// Wire request: `{ "type": "req", "id", "method", "params" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeRequest {
    #[serde(rename = "type")]
    pub typ: String,
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Wire response: `{ "type": "res", "id", "ok", "payload" or "error" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeResponse {
    #[serde(rename = "type")]
    pub typ: String,
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Wire push event: `{ "type": "event", "event", "payload" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeEventFrame {
    #[serde(rename = "type")]
    pub typ: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl BridgeRequest {
    pub fn new(
        id: impl Into<String>,
        method: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            typ: "req".to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

impl BridgeResponse {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            typ: "res".to_string(),
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            typ: "res".to_string(),
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}

/// One contact from the `loadContactOverview` snapshot: `{ "name", "uuid" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverviewEntry {
    pub name: String,
    pub uuid: String,
}

/// One message from the `loadChatHistory` snapshot. The snapshot carries all
/// contacts' messages interleaved in arbitrary order; `contact` keys the
/// conversation, `date` is epoch seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub contact: String,
    pub sent_by: SentBy,
    pub message: String,
    pub date: i64,
}

/// Payload of the `incomingMessage` push event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    #[serde(rename = "senderUUID")]
    pub sender_uuid: String,
    pub sender_name: String,
    pub message: String,
}

/// Payload of the `addContactResponse` push event. The backend encodes
/// `contactExists` as a native bool or as the strings "True"/"False"
/// (its serializer leaks language-native capitalization); anything else
/// is a malformed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddContactResponse {
    #[serde(deserialize_with = "bool_from_bool_or_str")]
    pub contact_exists: bool,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(rename = "contactUUID", default)]
    pub contact_uuid: Option<String>,
}

/// Strict boolean normalization: accepts a JSON bool or the exact strings
/// "true"/"True"/"false"/"False". No text substitution, no coercion of
/// other values.
fn bool_from_bool_or_str<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct BoolOrStr;

    impl de::Visitor<'_> for BoolOrStr {
        type Value = bool;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a boolean or \"True\"/\"False\"")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
            match v {
                "true" | "True" => Ok(true),
                "false" | "False" => Ok(false),
                _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
            }
        }
    }

    deserializer.deserialize_any(BoolOrStr)
}
