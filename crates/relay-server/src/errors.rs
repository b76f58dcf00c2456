//! Session error types.
//!
//! Every [`SessionError`] is fatal to the session that raised it. Whether it
//! also stops the rest of the server depends on the configured
//! [`FailureScope`](relay_settings::FailureScope).

use relay_core::FrameError;
use relay_embeddings::EmbeddingError;
use thiserror::Error;

/// A DATA fragment that breaks the reassembly rules.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReassemblyViolation {
    /// First fragment for an id did not carry a size.
    #[error("payload `{id}` is unknown and `{data}` is not a size declaration")]
    UnknownIdWithoutSize {
        /// Payload id.
        id: String,
        /// Offending fragment (truncated for display).
        data: String,
    },

    /// A fragment is longer than the bytes still expected.
    #[error("fragment of {fragment_len} bytes overruns payload `{id}` ({remaining} bytes remaining)")]
    Overrun {
        /// Payload id.
        id: String,
        /// Bytes still expected before this fragment.
        remaining: usize,
        /// Fragment length in bytes.
        fragment_len: usize,
    },

    /// The declared size exceeds the configured limit.
    #[error("payload `{id}` declares {size} bytes, limit is {max}")]
    DeclaredSizeTooLarge {
        /// Payload id.
        id: String,
        /// Declared size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
}

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Frame decode/encode or socket failure.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Fragment protocol violation.
    #[error(transparent)]
    Reassembly(#[from] ReassemblyViolation),

    /// Embedding failed or the model never became ready.
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
}

impl SessionError {
    /// Whether this is a socket failure rather than a protocol or embedding
    /// error.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Frame(e) if e.is_transport())
    }
}

/// How a session finished.
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer closed the connection cleanly between frames.
    PeerClosed,
    /// The peer sent `COMMAND close`.
    Command,
    /// The running flag cleared elsewhere.
    Cancelled,
    /// The session hit a fatal error.
    Failed(SessionError),
}

impl SessionEnd {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::Command => "command",
            Self::Cancelled => "cancelled",
            Self::Failed(e) if e.is_transport() => "transport_error",
            Self::Failed(_) => "failed",
        }
    }
}

/// Errors starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listening socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Socket-level failure on the listener.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),

    /// [`SessionManager::run`](crate::SessionManager::run) was already called.
    #[error("session manager has already run")]
    AlreadyRan,
}

/// Result alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_display() {
        let cases = vec![
            (
                ReassemblyViolation::UnknownIdWithoutSize {
                    id: "a".into(),
                    data: "hello".into(),
                },
                "payload `a` is unknown and `hello` is not a size declaration",
            ),
            (
                ReassemblyViolation::Overrun {
                    id: "a".into(),
                    remaining: 2,
                    fragment_len: 5,
                },
                "fragment of 5 bytes overruns payload `a` (2 bytes remaining)",
            ),
            (
                ReassemblyViolation::DeclaredSizeTooLarge {
                    id: "a".into(),
                    size: 10,
                    max: 4,
                },
                "payload `a` declares 10 bytes, limit is 4",
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn transport_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = SessionError::from(FrameError::from(io));
        assert!(err.is_transport());
        assert_eq!(SessionEnd::Failed(err).label(), "transport_error");

        let err = SessionError::from(FrameError::MissingKind);
        assert!(!err.is_transport());
        assert_eq!(SessionEnd::Failed(err).label(), "failed");
    }

    #[test]
    fn embedding_error_wraps() {
        let err = SessionError::from(EmbeddingError::ModelInit("gone".into()));
        assert_eq!(
            err.to_string(),
            "embedding failed: Model initialization failed: gone"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SessionError>();
        assert_send_sync::<ServerError>();
    }
}
