use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw frame as it arrives on the socket, before the event name is resolved.
#[derive(Deserialize, Debug)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    #[serde(default)]
    pub document_id: Option<Value>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CursorMessage {
    #[serde(default)]
    pub document_id: Option<Value>,
    #[serde(default)]
    pub x: Value,
    #[serde(default)]
    pub y: Value,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpdatedMessage {
    #[serde(default)]
    pub document_id: Option<Value>,
    #[serde(default)]
    pub delta: Value,
}

/// Events a client may send once its connection is active.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    JoinRoom(RoomMessage),
    LeaveRoom(RoomMessage),
    CursorUpdate(CursorMessage),
    DocumentUpdated(DocumentUpdatedMessage),
    Ping,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MalformedEventError {
    #[error("Malformed event frame: {0}")]
    Frame(String),
    #[error("Unknown event '{0}'")]
    UnknownEvent(String),
    #[error("Malformed payload for '{event}': {reason}")]
    Payload { event: String, reason: String },
}

impl ClientEvent {
    /// Decode a text frame of the form `{"event": "...", "data": {...}}`.
    ///
    /// A missing or `null` `data` decodes as an empty payload so the handlers
    /// can apply their own missing-field policy.
    pub fn decode(text: &str) -> Result<Self, MalformedEventError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| MalformedEventError::Frame(e.to_string()))?;

        let data = match envelope.data {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let event = envelope.event;

        fn payload<T: serde::de::DeserializeOwned>(event: &str, data: Value) -> Result<T, MalformedEventError> {
            serde_json::from_value(data).map_err(|e| MalformedEventError::Payload {
                event: event.to_string(),
                reason: e.to_string(),
            })
        }

        match event.as_str() {
            "join-room" => Ok(ClientEvent::JoinRoom(payload(&event, data)?)),
            "leave-room" => Ok(ClientEvent::LeaveRoom(payload(&event, data)?)),
            "cursor-update" => Ok(ClientEvent::CursorUpdate(payload(&event, data)?)),
            "document-updated" => Ok(ClientEvent::DocumentUpdated(payload(&event, data)?)),
            "ping" => Ok(ClientEvent::Ping),
            _ => Err(MalformedEventError::UnknownEvent(event)),
        }
    }
}

/// Normalize a client supplied document id. Strings and numbers are accepted,
/// anything empty or of another type counts as missing.
pub fn document_id_of(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Events pushed from the server to a connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    PresenceUpdate {
        document_id: String,
        member_identities: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    MemberJoined { identity: String, document_id: String },
    #[serde(rename_all = "camelCase")]
    MemberLeft { identity: String, document_id: String },
    #[serde(rename_all = "camelCase")]
    CursorUpdate { identity: String, x: Value, y: Value },
    #[serde(rename_all = "camelCase")]
    DocumentUpdated {
        document_id: String,
        delta: Value,
        updated_by: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<i64>,
    },
    Error { message: String },
    Pong { date: String },
}
