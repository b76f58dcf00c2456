//! Inbound messages and outbound job results.

use serde::{Deserialize, Serialize};

use crate::errors::{FrameError, Result};

/// Id echoed back for queries that did not carry one.
pub const ANONYMOUS_QUERY_ID: &str = "query";

/// A control instruction carried by a `COMMAND` frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Stop the whole service.
    Close,
    /// Keep-alive; no effect.
    Heartbeat,
    /// Anything else. Logged and ignored.
    Other(String),
}

impl Command {
    /// Parse a command name. Matching is case-insensitive and accepts the
    /// legacy `Quit` spelling for [`Command::Close`].
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "close" | "quit" => Self::Close,
            "heartbeat" => Self::Heartbeat,
            _ => Self::Other(name.to_string()),
        }
    }

    /// Canonical wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Close => "close",
            Self::Heartbeat => "heartbeat",
            Self::Other(name) => name,
        }
    }
}

/// A decoded client → server message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// One fragment of a multi-part payload. The first fragment for an id
    /// carries the declared total size as its `data`.
    Data {
        /// Client-chosen payload id.
        id: String,
        /// Fragment text (or the declared size on the first fragment).
        data: String,
    },
    /// A complete single-frame payload that needs an embedding.
    Query {
        /// Optional caller id, echoed back in the result.
        id: Option<String>,
        /// Query text.
        data: String,
    },
    /// A control instruction.
    Command(Command),
}

impl Message {
    /// Wire discriminator for this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data { .. } => "DATA",
            Self::Query { .. } => "QUERY",
            Self::Command(_) => "COMMAND",
        }
    }

    /// Parse a frame payload.
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)?;
        let wire: WireMessage = serde_json::from_str(text).map_err(FrameError::InvalidJson)?;
        let kind = wire.kind.ok_or(FrameError::MissingKind)?;
        match kind.as_str() {
            "DATA" => Ok(Self::Data {
                id: wire.id.ok_or(FrameError::MissingField {
                    kind: "DATA",
                    field: "id",
                })?,
                data: wire.data.ok_or(FrameError::MissingField {
                    kind: "DATA",
                    field: "data",
                })?,
            }),
            "QUERY" => Ok(Self::Query {
                id: wire.id,
                data: wire.data.ok_or(FrameError::MissingField {
                    kind: "QUERY",
                    field: "data",
                })?,
            }),
            "COMMAND" => {
                let name = wire.command.ok_or(FrameError::MissingField {
                    kind: "COMMAND",
                    field: "command",
                })?;
                Ok(Self::Command(Command::parse(&name)))
            }
            _ => Err(FrameError::UnknownKind(kind)),
        }
    }

    /// Serialize to a frame payload.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let wire = match self {
            Self::Data { id, data } => WireMessage {
                kind: Some("DATA".into()),
                id: Some(id.clone()),
                data: Some(data.clone()),
                command: None,
            },
            Self::Query { id, data } => WireMessage {
                kind: Some("QUERY".into()),
                id: id.clone(),
                data: Some(data.clone()),
                command: None,
            },
            Self::Command(cmd) => WireMessage {
                kind: Some("COMMAND".into()),
                id: None,
                data: None,
                command: Some(cmd.as_str().to_string()),
            },
        };
        serde_json::to_vec(&wire).map_err(FrameError::Encode)
    }
}

/// Flat JSON shape shared by all message kinds.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,
}

/// A computed embedding awaiting delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    /// Originating payload id, or [`ANONYMOUS_QUERY_ID`].
    pub id: String,
    /// Whether the job came from a `QUERY`.
    pub is_query: bool,
    /// Embedding vector.
    pub vector: Vec<f32>,
}

impl JobResult {
    /// Result for a reassembled document.
    pub fn document(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            is_query: false,
            vector,
        }
    }

    /// Result for a query; anonymous queries get [`ANONYMOUS_QUERY_ID`].
    pub fn query(id: Option<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.unwrap_or_else(|| ANONYMOUS_QUERY_ID.to_string()),
            is_query: true,
            vector,
        }
    }
}
