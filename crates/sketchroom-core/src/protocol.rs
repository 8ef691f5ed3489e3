//! Relay protocol message types
//!
//! Messages are JSON objects discriminated by a `type` field. A single
//! transport frame may carry several objects separated by newlines; each
//! line is decoded on its own so one bad line never poisons the rest.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::Stroke;

/// Message types the client understands when received
const INBOUND_TYPES: &[&str] = &["INIT", "DRAW", "CHAT", "SYSTEM", "PONG"];

/// Errors decoding an inbound message
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Line is not valid JSON
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// JSON object has no string `type` field
    #[error("Message has no `type` field")]
    MissingType,

    /// `type` is not one we handle
    #[error("Unknown message type '{0}'")]
    UnknownType(String),

    /// Known type with missing or mistyped payload fields
    #[error("Malformed {kind} message: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Messages received from the relay
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Full canvas snapshot, sent on connect
    #[serde(rename = "INIT")]
    Init {
        #[serde(default)]
        data: Vec<Stroke>,
    },

    /// One stroke's current full point sequence
    #[serde(rename = "DRAW")]
    Draw { data: Stroke },

    /// Chat text from a participant
    #[serde(rename = "CHAT")]
    Chat {
        #[serde(rename = "Name")]
        name: String,
        res: String,
    },

    /// System notification
    #[serde(rename = "SYSTEM")]
    System { message: String },

    /// Heartbeat response
    #[serde(rename = "PONG")]
    Pong,
}

impl ServerMessage {
    /// Decode a single JSON line
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line).map_err(ProtocolError::InvalidJson)?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        if !INBOUND_TYPES.contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownType(kind));
        }

        serde_json::from_value(value).map_err(|source| ProtocolError::Malformed { kind, source })
    }

    /// Wire name of this message type
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Init { .. } => "INIT",
            ServerMessage::Draw { .. } => "DRAW",
            ServerMessage::Chat { .. } => "CHAT",
            ServerMessage::System { .. } => "SYSTEM",
            ServerMessage::Pong => "PONG",
        }
    }
}

/// Messages sent to the relay
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Broadcast a stroke's full point sequence
    #[serde(rename = "DRAW")]
    Draw { data: Stroke },

    /// Chat text
    #[serde(rename = "CHAT")]
    Chat {
        #[serde(rename = "Name")]
        name: String,
        res: String,
    },

    /// System notification
    #[serde(rename = "SYSTEM")]
    System { message: String },

    /// Heartbeat probe
    #[serde(rename = "PING")]
    Ping,
}

impl ClientMessage {
    /// Create a draw message
    pub fn draw(stroke: Stroke) -> Self {
        ClientMessage::Draw { data: stroke }
    }

    /// Create a chat message
    pub fn chat(name: &str, text: &str) -> Self {
        ClientMessage::Chat {
            name: name.to_string(),
            res: text.to_string(),
        }
    }

    /// Create a system message
    pub fn system(message: impl Into<String>) -> Self {
        ClientMessage::System {
            message: message.into(),
        }
    }

    /// Encode message to a single JSON line (no trailing newline)
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Split a transport frame into its non-empty JSON lines
pub fn split_lines(frame: &str) -> impl Iterator<Item = &str> {
    frame.lines().map(str::trim).filter(|line| !line.is_empty())
}
