//! Frame error types.
//!
//! Every variant is fatal to the session that produced it. [`FrameError::Io`]
//! is the transport class (socket failure, peer reset); everything else is a
//! protocol violation by the peer.

use thiserror::Error;

/// Errors from decoding or encoding a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Socket read/write failure.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The length prefix announces more bytes than the configured limit.
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Announced payload length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The stream ended before a complete frame was read.
    #[error("stream closed mid-frame: expected {expected} bytes, {available} available")]
    Truncated {
        /// Bytes needed to finish the frame (prefix included).
        expected: usize,
        /// Bytes that were buffered when the stream ended.
        available: usize,
    },

    /// The payload is not UTF-8.
    #[error("frame payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The payload is not a JSON object.
    #[error("frame payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The JSON object has no `kind` discriminator.
    #[error("frame is missing the `kind` field")]
    MissingKind,

    /// The `kind` discriminator is not one of `DATA`, `QUERY`, `COMMAND`.
    #[error("unknown message kind `{0}`")]
    UnknownKind(String),

    /// A field required by the message kind is absent.
    #[error("{kind} frame is missing the `{field}` field")]
    MissingField {
        /// Message kind.
        kind: &'static str,
        /// Missing field name.
        field: &'static str,
    },

    /// Serializing an outbound value failed.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

impl FrameError {
    /// Whether this is a transport failure rather than a protocol violation.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Result alias for frame operations.
pub type Result<T> = std::result::Result<T, FrameError>;
