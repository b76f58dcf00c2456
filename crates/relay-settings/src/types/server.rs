//! Listener, session and shutdown settings.

use serde::{Deserialize, Serialize};

/// Where a computed result is delivered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryMode {
    /// One FIFO shared by every connection; whichever writer dequeues a
    /// result first sends it to its own client.
    #[default]
    Shared,
    /// Each connection has its own FIFO; results go back to the connection
    /// that sent the request.
    PerSession,
}

/// How far a session failure reaches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureScope {
    /// Any session error or disconnect stops the whole server.
    #[default]
    Global,
    /// A session error or disconnect ends only that session.
    Session,
}

/// Server network and lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// How long a single accept waits before counting as idle, in ms.
    pub accept_timeout_ms: u64,
    /// Consecutive idle accept timeouts (with no sessions) before shutting
    /// down. `None` disables idle shutdown.
    pub idle_shutdown_after: Option<u32>,
    /// Idle read timeout on client sockets, in ms. Not fatal on expiry.
    pub read_timeout_ms: u64,
    /// Largest accepted frame payload, in bytes.
    pub max_frame_bytes: usize,
    /// Largest declared size for a reassembled payload, in bytes.
    pub max_payload_bytes: usize,
    /// How long to wait for sessions to finish after shutdown, in ms.
    pub drain_timeout_ms: u64,
    /// Result addressing.
    pub delivery_mode: DeliveryMode,
    /// Failure propagation.
    pub failure_scope: FailureScope,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5096,
            accept_timeout_ms: 5000,
            idle_shutdown_after: Some(3),
            read_timeout_ms: 5000,
            max_frame_bytes: 16 * 1024 * 1024,
            max_payload_bytes: 16 * 1024 * 1024,
            drain_timeout_ms: 30_000,
            delivery_mode: DeliveryMode::Shared,
            failure_scope: FailureScope::Global,
        }
    }
}
