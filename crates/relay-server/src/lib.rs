//! # relay-server
//!
//! TCP front end of the embedding relay.
//!
//! - [`SessionManager`]: binds the listener, spawns a [`ConnectionSession`]
//!   per client, shuts down after repeated idle accept timeouts, drains
//! - [`ConnectionSession`]: reader loop (frames → reassembly → dispatch) and
//!   writer loop (result queue → socket)
//! - [`ReassemblyTable`]: multi-fragment DATA payloads
//! - [`Dispatcher`]: readiness gate + single-slot embedding worker →
//!   [`ResultQueue`]

#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod manager;
pub mod metrics;
pub mod reassembly;
pub mod registry;
pub mod result_queue;
pub mod session;
pub mod shutdown;

pub use config::ServerConfig;
pub use dispatch::{Dispatcher, Job};
pub use errors::{ReassemblyViolation, Result, ServerError, SessionEnd, SessionError};
pub use manager::{ManagerState, SessionManager};
pub use reassembly::{Reassembly, ReassemblyTable, SessionId};
pub use registry::{SessionHandle, SessionRegistry};
pub use result_queue::ResultQueue;
pub use session::{ConnectionSession, SessionContext};
pub use shutdown::ShutdownCoordinator;
