//! Server configuration.

use std::time::Duration;

use relay_settings::{DeliveryMode, FailureScope, ServerSettings};

/// Runtime configuration for the session manager.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// How long one accept waits before it counts as idle.
    pub accept_timeout: Duration,
    /// Idle accept timeouts (with no sessions) before shutdown; `None` never.
    pub idle_shutdown_after: Option<u32>,
    /// Idle read timeout on client sockets. Expiry is not fatal.
    pub read_timeout: Duration,
    /// Largest accepted frame payload, in bytes.
    pub max_frame_bytes: usize,
    /// Largest declared reassembly size, in bytes.
    pub max_payload_bytes: usize,
    /// How long to wait for sessions after shutdown before aborting them.
    pub drain_timeout: Duration,
    /// Result addressing.
    pub delivery_mode: DeliveryMode,
    /// Failure propagation.
    pub failure_scope: FailureScope,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

impl ServerConfig {
    /// Create config from settings.
    pub fn from_settings(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            accept_timeout: Duration::from_millis(s.accept_timeout_ms),
            idle_shutdown_after: s.idle_shutdown_after,
            read_timeout: Duration::from_millis(s.read_timeout_ms),
            max_frame_bytes: s.max_frame_bytes,
            max_payload_bytes: s.max_payload_bytes,
            drain_timeout: Duration::from_millis(s.drain_timeout_ms),
            delivery_mode: s.delivery_mode,
            failure_scope: s.failure_scope,
        }
    }

    /// `host:port` bind string.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
