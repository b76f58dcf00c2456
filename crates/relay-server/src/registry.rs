//! Live session tracking.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::reassembly::SessionId;

/// What the registry knows about one running session.
#[derive(Debug)]
pub struct SessionHandle {
    /// Session id.
    pub id: SessionId,
    /// Remote address.
    pub peer: SocketAddr,
    /// When the connection was accepted.
    pub connected_at: Instant,
}

impl SessionHandle {
    /// Create a handle for a freshly accepted session.
    pub fn new(id: SessionId, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            connected_at: Instant::now(),
        }
    }

    /// Time since accept.
    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Sessions currently running, indexed by id.
///
/// The accept loop reads [`count`](Self::count) to decide whether an accept
/// timeout counts toward idle shutdown.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session.
    pub async fn add(&self, handle: Arc<SessionHandle>) {
        let mut sessions = self.sessions.write().await;
        let _ = sessions.insert(handle.id, handle);
    }

    /// Remove a session by id.
    pub async fn remove(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        let removed = self.sessions.write().await.remove(&id);
        if let Some(ref handle) = removed {
            debug!(
                session_id = id,
                peer = %handle.peer,
                uptime_ms = handle.uptime().as_millis(),
                "session unregistered"
            );
        }
        removed
    }

    /// Number of running sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
