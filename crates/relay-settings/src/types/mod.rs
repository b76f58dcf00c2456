//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file only needs the keys it changes.

mod embedding;
mod logging;
mod server;

pub use embedding::*;
pub use logging::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 6000, "deliveryMode": "perSession" },
///   "logging": { "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Listener and session lifecycle.
    pub server: ServerSettings,
    /// Embedding backend.
    pub embedding: EmbeddingSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.accept_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.acceptTimeoutMs must be positive".into(),
            ));
        }
        if self.server.read_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.readTimeoutMs must be positive".into(),
            ));
        }
        if self.server.max_frame_bytes == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxFrameBytes must be positive".into(),
            ));
        }
        if self.server.idle_shutdown_after == Some(0) {
            return Err(SettingsError::InvalidValue(
                "server.idleShutdownAfter must be at least 1 (or null to disable)".into(),
            ));
        }
        if self.embedding.worker_queue_depth == 0 {
            return Err(SettingsError::InvalidValue(
                "embedding.workerQueueDepth must be positive".into(),
            ));
        }
        Ok(())
    }
}
