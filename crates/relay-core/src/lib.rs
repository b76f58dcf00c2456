//! # relay-core
//!
//! Wire-level types and the frame codec shared by the relay server and its
//! clients.
//!
//! Every message on the socket, in either direction, is a 4-byte big-endian
//! length prefix followed by that many bytes of UTF-8 JSON:
//!
//! ```text
//! [u32 BE length N][N bytes JSON]
//! ```
//!
//! - Client → server: [`Message`] (`DATA`, `QUERY`, `COMMAND`)
//! - Server → client: [`JobResult`]

#![deny(unsafe_code)]

pub mod codec;
pub mod errors;
pub mod message;

pub use codec::{
    encode_result, ClientCodec, FrameCodec, DEFAULT_MAX_FRAME_BYTES, LENGTH_PREFIX_BYTES,
};
pub use errors::{FrameError, Result};
pub use message::{Command, JobResult, Message, ANONYMOUS_QUERY_ID};
