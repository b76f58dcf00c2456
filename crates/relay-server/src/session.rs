//! Connection session lifecycle: one accepted TCP client from accept
//! through teardown.
//!
//! Each session runs two loops concurrently:
//! - the **reader** decodes frames, feeds DATA through the reassembly table
//!   and dispatches completed payloads and queries
//! - the **writer** pops results from its queue and writes them back
//!
//! Both stop when the session's running flag clears. If the peer closed
//! its side first, the writer still flushes results already queued before it
//! closes the socket. Under
//! [`FailureScope::Global`] that flag is the server's own, so any session
//! ending stops the service; under [`FailureScope::Session`] it is a child
//! flag that only this session clears.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use relay_core::{Command, FrameCodec, FrameError, Message};
use relay_settings::FailureScope;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::ServerConfig;
use crate::dispatch::{Dispatcher, Job};
use crate::errors::{SessionEnd, SessionError};
use crate::metrics::{CONNECTIONS_ACTIVE, FRAMES_TOTAL, RESULTS_DELIVERED_TOTAL, SESSIONS_ENDED_TOTAL};
use crate::reassembly::{Reassembly, ReassemblyTable, SessionId};
use crate::registry::{SessionHandle, SessionRegistry};
use crate::result_queue::ResultQueue;

/// State shared by every session of one manager.
#[derive(Debug)]
pub struct SessionContext {
    /// Runtime configuration.
    pub config: Arc<ServerConfig>,
    /// Pending DATA payloads.
    pub reassembly: Arc<ReassemblyTable>,
    /// Embedding dispatch.
    pub dispatcher: Dispatcher,
    /// Live sessions.
    pub registry: Arc<SessionRegistry>,
    /// The server-wide running flag.
    pub shutdown: CancellationToken,
}

/// One accepted client connection.
pub struct ConnectionSession {
    id: SessionId,
    peer: SocketAddr,
    ctx: Arc<SessionContext>,
    queue: Arc<ResultQueue>,
    running: CancellationToken,
}

impl ConnectionSession {
    /// Create a session that delivers results from `queue`.
    pub fn new(
        id: SessionId,
        peer: SocketAddr,
        ctx: Arc<SessionContext>,
        queue: Arc<ResultQueue>,
    ) -> Self {
        let running = match ctx.config.failure_scope {
            FailureScope::Global => ctx.shutdown.clone(),
            FailureScope::Session => ctx.shutdown.child_token(),
        };
        Self {
            id,
            peer,
            ctx,
            queue,
            running,
        }
    }

    /// Run both loops to completion and tear the session down.
    #[instrument(skip_all, fields(session_id = self.id, peer = %self.peer))]
    pub async fn run(self, stream: TcpStream) -> SessionEnd {
        let (read_half, write_half) = stream.into_split();
        let codec = FrameCodec::with_max_frame_bytes(self.ctx.config.max_frame_bytes);
        let reader = FramedRead::new(read_half, codec.clone());
        let writer = FramedWrite::new(write_half, codec);

        info!("client connected");
        gauge!(CONNECTIONS_ACTIVE).increment(1.0);
        let handle = Arc::new(SessionHandle::new(self.id, self.peer));
        self.ctx.registry.add(handle).await;

        let peer_closed = CancellationToken::new();
        let reading = async {
            let end = self.read_loop(reader).await;
            if matches!(end, SessionEnd::PeerClosed) {
                peer_closed.cancel();
            }
            self.settle(&end);
            end
        };
        let writing = async {
            let stop = WriterStop {
                running: &self.running,
                peer_closed: &peer_closed,
                flush_timeout: self.ctx.config.drain_timeout,
            };
            let written = write_loop(writer, &self.queue, stop).await;
            if written.is_err() {
                self.running.cancel();
            }
            written
        };
        let (mut end, written) = tokio::join!(reading, writing);

        if let Err(e) = written {
            if matches!(end, SessionEnd::Cancelled) {
                end = SessionEnd::Failed(e.into());
            } else {
                warn!(error = %e, "writer failed");
            }
        }

        let dropped = self.ctx.reassembly.drop_session(self.id);
        if dropped > 0 {
            debug!(dropped, "discarded unfinished payloads");
        }
        let _ = self.ctx.registry.remove(self.id).await;
        gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
        counter!(SESSIONS_ENDED_TOTAL, "reason" => end.label()).increment(1);
        match &end {
            SessionEnd::Failed(e) => warn!(error = %e, reason = end.label(), "client disconnected"),
            _ => info!(reason = end.label(), "client disconnected"),
        }
        end
    }

    /// Clear the running flag the way `end` requires.
    fn settle(&self, end: &SessionEnd) {
        match end {
            SessionEnd::Command => {
                info!("close command received, stopping server");
                self.ctx.shutdown.cancel();
            }
            SessionEnd::Cancelled => {}
            SessionEnd::PeerClosed | SessionEnd::Failed(_) => self.running.cancel(),
        }
    }

    async fn read_loop(&self, mut reader: FramedRead<OwnedReadHalf, FrameCodec>) -> SessionEnd {
        let read_timeout = self.ctx.config.read_timeout;
        loop {
            let next = tokio::select! {
                biased;
                () = self.running.cancelled() => return SessionEnd::Cancelled,
                next = tokio::time::timeout(read_timeout, reader.next()) => next,
            };
            let message = match next {
                Err(_) => {
                    trace!("read idle");
                    continue;
                }
                Ok(None) => return SessionEnd::PeerClosed,
                Ok(Some(Err(e))) => return SessionEnd::Failed(e.into()),
                Ok(Some(Ok(message))) => message,
            };
            counter!(FRAMES_TOTAL, "kind" => message.kind()).increment(1);
            match self.handle(message).await {
                Ok(None) => {}
                Ok(Some(end)) => return end,
                Err(e) => return SessionEnd::Failed(e),
            }
        }
    }

    async fn handle(&self, message: Message) -> Result<Option<SessionEnd>, SessionError> {
        match message {
            Message::Data { id, data } => {
                match self.ctx.reassembly.submit_fragment(self.id, &id, &data)? {
                    Reassembly::Complete(text) => self.dispatch(Job::Document { id, text }).await,
                    Reassembly::Incomplete { remaining } => {
                        trace!(payload_id = %id, remaining, "fragment buffered");
                        Ok(None)
                    }
                }
            }
            Message::Query { id, data } => self.dispatch(Job::Query { id, text: data }).await,
            Message::Command(Command::Close) => Ok(Some(SessionEnd::Command)),
            Message::Command(Command::Heartbeat) => {
                debug!("heartbeat");
                Ok(None)
            }
            Message::Command(Command::Other(name)) => {
                warn!(command = %name, "ignoring unknown command");
                Ok(None)
            }
        }
    }

    async fn dispatch(&self, job: Job) -> Result<Option<SessionEnd>, SessionError> {
        tokio::select! {
            biased;
            () = self.running.cancelled() => Ok(Some(SessionEnd::Cancelled)),
            dispatched = self.ctx.dispatcher.dispatch(job, &self.queue) => {
                dispatched?;
                Ok(None)
            }
        }
    }
}

/// When and how the writer stops.
struct WriterStop<'a> {
    running: &'a CancellationToken,
    /// Set once the peer has closed its side.
    peer_closed: &'a CancellationToken,
    flush_timeout: Duration,
}

/// Deliver results until `running` clears, then close the write half.
///
/// After a peer half-close, queued results are flushed first, for at most
/// `flush_timeout`.
async fn write_loop(
    mut writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
    queue: &ResultQueue,
    stop: WriterStop<'_>,
) -> Result<(), FrameError> {
    loop {
        let result = tokio::select! {
            biased;
            () = stop.running.cancelled() => break,
            result = queue.pop() => result,
        };
        let id = result.id.clone();
        writer.send(result).await?;
        counter!(RESULTS_DELIVERED_TOTAL).increment(1);
        debug!(payload_id = %id, "result delivered");
    }
    if stop.peer_closed.is_cancelled() {
        match tokio::time::timeout(stop.flush_timeout, flush(&mut writer, queue)).await {
            Ok(flushed) => {
                let flushed = flushed?;
                if flushed > 0 {
                    debug!(flushed, "flushed queued results after peer close");
                }
            }
            Err(_) => warn!(remaining = queue.len(), "timed out flushing queued results"),
        }
    }
    let _ = writer.close().await;
    Ok(())
}

async fn flush(
    writer: &mut FramedWrite<OwnedWriteHalf, FrameCodec>,
    queue: &ResultQueue,
) -> Result<usize, FrameError> {
    let mut flushed = 0;
    while let Some(result) = queue.try_pop() {
        writer.send(result).await?;
        counter!(RESULTS_DELIVERED_TOTAL).increment(1);
        flushed += 1;
    }
    Ok(flushed)
}
