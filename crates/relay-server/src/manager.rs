//! Session manager: accept loop, idle shutdown and drain.
//!
//! ```text
//! Listening ──accept──▶ spawn session ──▶ Listening
//! Listening ──running flag cleared──▶ Draining ──▶ Stopped
//! ```
//!
//! The running flag clears on `COMMAND close`, on a session ending under the
//! global failure scope, on [`SessionManager::shutdown`], or when the idle
//! counter reaches its limit. The counter grows by one per accept timeout
//! while no sessions are running and resets whenever one is.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use parking_lot::Mutex;
use relay_embeddings::{EmbeddingService, EmbeddingWorker, ReadinessGate};
use relay_settings::DeliveryMode;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::errors::{Result, ServerError};
use crate::metrics::CONNECTIONS_TOTAL;
use crate::reassembly::ReassemblyTable;
use crate::registry::SessionRegistry;
use crate::result_queue::ResultQueue;
use crate::session::{ConnectionSession, SessionContext};
use crate::shutdown::ShutdownCoordinator;

/// Lifecycle of the accept loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerState {
    /// Accepting connections.
    Listening,
    /// Running flag cleared; waiting for sessions to finish.
    Draining,
    /// Listener closed and embedding worker stopped.
    Stopped,
}

/// Accepts connections and owns every session's shared state.
pub struct SessionManager {
    config: Arc<ServerConfig>,
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    ctx: Arc<SessionContext>,
    shared_queue: Arc<ResultQueue>,
    shutdown: Arc<ShutdownCoordinator>,
    state: watch::Sender<ManagerState>,
    next_session_id: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_cancel: CancellationToken,
}

impl SessionManager {
    /// Bind the listener and start the embedding worker.
    ///
    /// `gate` is opened by whoever loads the model; jobs wait on it.
    pub async fn bind(
        config: ServerConfig,
        gate: Arc<ReadinessGate>,
        service: Arc<dyn EmbeddingService>,
        worker_queue_depth: usize,
    ) -> Result<Self> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let worker_cancel = CancellationToken::new();
        let (worker, embedder) =
            EmbeddingWorker::new(service, worker_queue_depth, worker_cancel.clone());
        let worker = worker.spawn();

        let config = Arc::new(config);
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let ctx = Arc::new(SessionContext {
            config: Arc::clone(&config),
            reassembly: Arc::new(ReassemblyTable::new(config.max_payload_bytes)),
            dispatcher: Dispatcher::new(gate, embedder),
            registry: Arc::new(SessionRegistry::new()),
            shutdown: shutdown.token(),
        });
        let (state, _) = watch::channel(ManagerState::Listening);

        info!(%local_addr, delivery = ?config.delivery_mode, scope = ?config.failure_scope, "listener bound");
        Ok(Self {
            config,
            listener: Mutex::new(Some(listener)),
            local_addr,
            ctx,
            shared_queue: Arc::new(ResultQueue::new()),
            shutdown,
            state,
            next_session_id: AtomicU64::new(1),
            worker: Mutex::new(Some(worker)),
            worker_cancel,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ManagerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ManagerState> {
        self.state.subscribe()
    }

    /// The server-wide running flag.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Accept connections until the running flag clears, then drain.
    ///
    /// Can be called once; later calls fail with [`ServerError::AlreadyRan`].
    #[instrument(skip_all, fields(addr = %self.local_addr))]
    pub async fn run(&self) -> Result<()> {
        let Some(listener) = self.listener.lock().take() else {
            return Err(ServerError::AlreadyRan);
        };
        let token = self.shutdown.token();
        let mut sessions: Vec<JoinHandle<()>> = Vec::new();
        let mut idle_timeouts: u32 = 0;

        info!("accepting connections");
        loop {
            sessions.retain(|task| !task.is_finished());
            let accepted = tokio::select! {
                biased;
                () = token.cancelled() => break,
                accepted = tokio::time::timeout(self.config.accept_timeout, listener.accept()) => accepted,
            };
            match accepted {
                Ok(Ok((stream, peer))) => {
                    idle_timeouts = 0;
                    sessions.push(self.spawn_session(stream, peer));
                }
                Ok(Err(e)) => warn!(error = %e, "accept failed"),
                Err(_) => {
                    if self.ctx.registry.count().await > 0 {
                        idle_timeouts = 0;
                        continue;
                    }
                    idle_timeouts += 1;
                    debug!(idle_timeouts, "accept timed out with no sessions");
                    if self
                        .config
                        .idle_shutdown_after
                        .is_some_and(|limit| idle_timeouts >= limit)
                    {
                        info!(idle_timeouts, "idle limit reached, shutting down");
                        self.shutdown.shutdown();
                        break;
                    }
                }
            }
        }

        let _ = self.state.send_replace(ManagerState::Draining);
        let aborted = self
            .shutdown
            .graceful_shutdown(sessions, Some(self.config.drain_timeout))
            .await;
        drop(listener);

        self.worker_cancel.cancel();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "embedding worker panicked");
            }
        }
        let _ = self.state.send_replace(ManagerState::Stopped);
        info!(aborted, undelivered = self.shared_queue.len(), "server stopped");
        Ok(())
    }

    fn spawn_session(&self, stream: tokio::net::TcpStream, peer: SocketAddr) -> JoinHandle<()> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        counter!(CONNECTIONS_TOTAL).increment(1);
        if let Err(e) = stream.set_nodelay(true) {
            debug!(session_id = id, error = %e, "set_nodelay failed");
        }
        let queue = match self.config.delivery_mode {
            DeliveryMode::Shared => Arc::clone(&self.shared_queue),
            DeliveryMode::PerSession => Arc::new(ResultQueue::new()),
        };
        let session = ConnectionSession::new(id, peer, Arc::clone(&self.ctx), queue);
        tokio::spawn(async move {
            let _ = session.run(stream).await;
        })
    }
}
