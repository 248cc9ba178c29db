//! Wire format shared by the relay and its clients.
//!
//! Every WebSocket text frame is a JSON object of the form
//! `{"event": <name>, "data": <payload>}`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::WebSocketError;

/// Server-assigned identifier of one live connection. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A present user as announced in `users` broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: ConnectionId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
}

/// An addressed message as it travels through the relay.
///
/// Only `to` is interpreted server side. Everything else is carried in
/// `cargo` and written back out untouched, including fields the relay has
/// never heard of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(flatten)]
    pub cargo: Map<String, Value>,
}

impl Envelope {
    /// Addresses a typed payload to `to`.
    pub fn address<T: Serialize>(to: ConnectionId, payload: &T) -> Result<Self, serde_json::Error> {
        let cargo = match serde_json::to_value(payload)? {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("content".to_string(), other);
                map
            }
        };
        Ok(Self {
            to: Some(to.to_string()),
            cargo,
        })
    }

    /// The non-empty recipient, if any.
    pub fn recipient(&self) -> Option<&str> {
        self.to.as_deref().filter(|to| !to.is_empty())
    }

    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::to_value(self).and_then(serde_json::from_value)
    }
}

/// Events a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Register { name: Option<String> },
    PrivateMessage(Envelope),
}

#[derive(Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientEvent {
    /// Decodes a text frame.
    ///
    /// `register` is lenient: a missing, null or malformed payload decodes
    /// as a registration without a name.
    pub fn decode(text: &str) -> Result<Self, WebSocketError> {
        let frame: Frame = serde_json::from_str(text)?;
        match frame.event.as_str() {
            "register" => {
                let name = match frame.data {
                    Value::Object(mut payload) => match payload.remove("name") {
                        Some(Value::String(name)) => Some(name),
                        _ => None,
                    },
                    _ => None,
                };
                Ok(ClientEvent::Register { name })
            }
            "private_message" => Ok(ClientEvent::PrivateMessage(serde_json::from_value(frame.data)?)),
            other => Err(WebSocketError::UnknownEvent(other.to_string())),
        }
    }

    pub fn encode(&self) -> Result<String, WebSocketError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Events the relay emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// First frame on every connection, carrying its identifier.
    Connected { id: ConnectionId },
    Users(Vec<UserRecord>),
    PrivateMessage(Envelope),
}

impl ServerEvent {
    pub fn encode(&self) -> Result<String, WebSocketError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, WebSocketError> {
        Ok(serde_json::from_str(text)?)
    }
}
