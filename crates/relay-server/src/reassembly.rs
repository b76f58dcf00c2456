//! Fragment reassembly for DATA messages.
//!
//! The first DATA frame for an id declares the payload's total size in UTF-8
//! bytes; every later frame appends text until exactly that many bytes have
//! arrived. Entries are scoped to the session that created them, so two
//! clients may reuse an id without colliding, and a session's unfinished
//! payloads are discarded when it ends.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::errors::ReassemblyViolation;

/// Identifies one connection for the lifetime of the process.
pub type SessionId = u64;

/// Longest fragment excerpt kept in a violation.
const EXCERPT_CHARS: usize = 32;

/// Outcome of submitting one fragment.
#[derive(Debug, PartialEq, Eq)]
pub enum Reassembly {
    /// The payload is complete; its entry has been removed.
    Complete(String),
    /// More bytes are expected.
    Incomplete {
        /// Bytes still outstanding.
        remaining: usize,
    },
}

#[derive(Debug)]
struct PendingPayload {
    declared_size: usize,
    accumulated: String,
    remaining: usize,
}

/// In-progress multi-fragment payloads, shared by every reader loop.
#[derive(Debug)]
pub struct ReassemblyTable {
    entries: Mutex<HashMap<(SessionId, String), PendingPayload>>,
    max_payload_bytes: usize,
}

impl ReassemblyTable {
    /// Create an empty table that rejects declarations above
    /// `max_payload_bytes`.
    pub fn new(max_payload_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_payload_bytes,
        }
    }

    /// Feed one DATA fragment.
    ///
    /// For an id with no pending entry, `data` must be the declared size as
    /// a non-negative integer. A declared size of zero completes at once with
    /// an empty payload.
    pub fn submit_fragment(
        &self,
        session: SessionId,
        id: &str,
        data: &str,
    ) -> Result<Reassembly, ReassemblyViolation> {
        let mut entries = self.entries.lock();
        let key = (session, id.to_string());

        let Some(entry) = entries.get_mut(&key) else {
            let size = data
                .trim()
                .parse::<usize>()
                .map_err(|_| ReassemblyViolation::UnknownIdWithoutSize {
                    id: id.to_string(),
                    data: data.chars().take(EXCERPT_CHARS).collect(),
                })?;
            if size > self.max_payload_bytes {
                return Err(ReassemblyViolation::DeclaredSizeTooLarge {
                    id: id.to_string(),
                    size,
                    max: self.max_payload_bytes,
                });
            }
            if size == 0 {
                return Ok(Reassembly::Complete(String::new()));
            }
            debug!(session_id = session, payload_id = id, size, "payload declared");
            let _ = entries.insert(
                key,
                PendingPayload {
                    declared_size: size,
                    accumulated: String::with_capacity(size),
                    remaining: size,
                },
            );
            return Ok(Reassembly::Incomplete { remaining: size });
        };

        let fragment_len = data.len();
        if fragment_len > entry.remaining {
            return Err(ReassemblyViolation::Overrun {
                id: id.to_string(),
                remaining: entry.remaining,
                fragment_len,
            });
        }
        entry.accumulated.push_str(data);
        entry.remaining -= fragment_len;
        if entry.remaining > 0 {
            return Ok(Reassembly::Incomplete {
                remaining: entry.remaining,
            });
        }

        let Some(done) = entries.remove(&key) else {
            return Ok(Reassembly::Incomplete { remaining: 0 });
        };
        debug!(
            session_id = session,
            payload_id = id,
            size = done.declared_size,
            "payload complete"
        );
        Ok(Reassembly::Complete(done.accumulated))
    }

    /// Discard every pending payload owned by `session`. Returns how many
    /// were dropped.
    pub fn drop_session(&self, session: SessionId) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(owner, _), _| *owner != session);
        before - entries.len()
    }

    /// Number of pending payloads across all sessions.
    pub fn pending(&self) -> usize {
        self.entries.lock().len()
    }
}
