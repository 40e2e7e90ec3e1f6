//! JSON wire protocol between editors and the relay server.
//!
//! Every frame is one WebSocket text message holding one JSON object:
//!
//! ```text
//! canonical text   { "text": "shared draft" }             both directions
//! insert           { "type": "insert", "pos": 3, "char": "l" }   client → server
//! delete           { "type": "delete", "pos": 4 }                client → server
//! ```
//!
//! A deployment fixes one [`WireFormat`]. With [`WireFormat::Snapshot`]
//! only canonical-text frames are ever sent. With [`WireFormat::Operation`]
//! clients send insert/delete frames (and canonical-text frames when the
//! diff falls back to a full replace); the server still answers with
//! canonical text.
//!
//! There is no envelope version, acknowledgement, sequence number or
//! authentication payload.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diff::{DiffStrategy, EditOperation, GapPolicy};

/// Path the relay server accepts WebSocket upgrades on.
pub const ENDPOINT_PATH: &str = "/ws";

/// Which wire format a deployment speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Full text after every quiet period.
    #[default]
    Snapshot,
    /// Single-character insert/delete operations.
    Operation,
}

impl WireFormat {
    /// The diff strategy that produces frames of this format.
    pub fn diff_strategy(self, policy: GapPolicy) -> DiffStrategy {
        match self {
            Self::Snapshot => DiffStrategy::Snapshot,
            Self::Operation => DiffStrategy::SingleEdit(policy),
        }
    }
}

/// Full canonical text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalTextMessage {
    pub text: String,
}

impl CanonicalTextMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A single-character edit, positions counted in chars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OperationMessage {
    Insert {
        pos: usize,
        #[serde(rename = "char")]
        ch: char,
    },
    Delete {
        pos: usize,
    },
}

/// Any frame on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    Operation(OperationMessage),
    Text(CanonicalTextMessage),
}

impl WireMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(CanonicalTextMessage::new(text))
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Parse a JSON text frame.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

impl From<&EditOperation> for WireMessage {
    fn from(op: &EditOperation) -> Self {
        match op {
            EditOperation::FullReplace { text } => Self::text(text.clone()),
            EditOperation::Insert { pos, ch } => Self::Operation(OperationMessage::Insert {
                pos: *pos,
                ch: *ch,
            }),
            EditOperation::Delete { pos } => Self::Operation(OperationMessage::Delete { pos: *pos }),
        }
    }
}

impl From<OperationMessage> for EditOperation {
    fn from(op: OperationMessage) -> Self {
        match op {
            OperationMessage::Insert { pos, ch } => Self::Insert { pos, ch },
            OperationMessage::Delete { pos } => Self::Delete { pos },
        }
    }
}

/// Build the WebSocket endpoint for a hosting origin.
///
/// The scheme mirrors the origin's: `https` → `wss`, `http` → `ws`.
/// `ws`/`wss` origins are taken as they are.
pub fn endpoint_url(origin: &str) -> Result<String, ProtocolError> {
    let origin = origin.trim().trim_end_matches('/');
    let invalid = || ProtocolError::InvalidEndpoint(origin.to_string());

    let (scheme, rest) = origin.split_once("://").ok_or_else(invalid)?;
    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        _ => return Err(invalid()),
    };
    if rest.is_empty() {
        return Err(invalid());
    }
    Ok(format!("{ws_scheme}://{rest}{ENDPOINT_PATH}"))
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("deserialization error: {0}")]
    Deserialization(String),
    #[error("invalid endpoint origin: {0}")]
    InvalidEndpoint(String),
    #[error("websocket error: {0}")]
    WebSocket(String),
    #[error("outgoing channel full")]
    ChannelFull,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("session closed")]
    SessionClosed,
}
