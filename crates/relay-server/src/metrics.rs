//! Metric name constants.
//!
//! Recorded through the `metrics` facade. Installing an exporter is left to
//! the embedding binary; without one, recording is a no-op.

/// Connections accepted (counter).
pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Sessions currently running (gauge).
pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Sessions ended (counter, labels: reason).
pub const SESSIONS_ENDED_TOTAL: &str = "relay_sessions_ended_total";
/// Frames decoded (counter, labels: kind).
pub const FRAMES_TOTAL: &str = "relay_frames_total";
/// Embedding jobs dispatched (counter, labels: kind).
pub const JOBS_TOTAL: &str = "relay_jobs_total";
/// Time spent waiting for an embedding (histogram).
pub const EMBED_DURATION_SECONDS: &str = "relay_embed_duration_seconds";
/// Results written to a socket (counter).
pub const RESULTS_DELIVERED_TOTAL: &str = "relay_results_delivered_total";
