//! TCP listener, accept loop, and orderly shutdown.
//!
//! This module is responsible for:
//!
//! 1. Binding the listener with `SO_REUSEADDR` and an explicit backlog.
//! 2. Accepting connections and turning each into a registered [`Client`].
//! 3. Spawning one session task per client and one broadcaster task.
//! 4. Shutting down when the `running` flag is cleared: stop accepting, give
//!    the broadcaster a bounded grace period, then close every connection
//!    still registered.
//!
//! # Accept errors
//!
//! An interrupted `accept` is retried.  Any other accept error is fatal to
//! the acceptor and returned from [`TelemetryServer::run`] after the normal
//! shutdown sequence has run.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use telemetry_core::{DriftSource, RandomDrift};
use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::application::dispatcher::Dispatcher;
use crate::application::registry::{Client, ClientRegistry};
use crate::application::vehicle::SharedVehicle;
use crate::domain::ServerConfig;
use crate::infrastructure::broadcaster::Broadcaster;
use crate::infrastructure::session::{run_session, SessionContext};
use crate::infrastructure::tcp_sink::StreamSink;

/// How often the accept loop wakes up to look at the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
}

/// A bound, not yet running, telemetry server.
pub struct TelemetryServer {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    vehicle: Arc<SharedVehicle>,
    registry: Arc<ClientRegistry>,
}

impl TelemetryServer {
    /// Creates the listening socket.  Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] if the socket cannot be created, bound, or put
    /// into the listening state (port in use, no permission, ...).
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = config.bind_addr;
        let bind_err = |source| ServerError::Bind { addr, source };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        let listener = socket.listen(config.backlog).map_err(bind_err)?;

        Ok(Self {
            listener,
            config: Arc::new(config),
            vehicle: Arc::new(SharedVehicle::default()),
            registry: Arc::new(ClientRegistry::new()),
        })
    }

    /// The address actually bound (useful when the config asked for port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn vehicle(&self) -> Arc<SharedVehicle> {
        Arc::clone(&self.vehicle)
    }

    /// Runs with OS-seeded random drift until `running` is cleared.
    pub async fn run(self, running: Arc<AtomicBool>) -> Result<(), ServerError> {
        self.run_with_drift(running, Box::new(RandomDrift::from_entropy()))
            .await
    }

    /// Runs with the given drift source until `running` is cleared or accept
    /// fails fatally.
    pub async fn run_with_drift(
        self,
        running: Arc<AtomicBool>,
        drift: Box<dyn DriftSource>,
    ) -> Result<(), ServerError> {
        let ctx = Arc::new(SessionContext {
            dispatcher: Arc::new(Dispatcher::new(
                Arc::clone(&self.vehicle),
                Arc::clone(&self.registry),
                self.config.operator.clone(),
            )),
            registry: Arc::clone(&self.registry),
            max_line_len: self.config.max_line_len,
        });

        let broadcaster = Broadcaster::new(
            Arc::clone(&self.vehicle),
            Arc::clone(&self.registry),
            drift,
            self.config.telemetry_period,
        );
        let broadcaster = tokio::spawn(broadcaster.run(Arc::clone(&running)));

        if let Ok(addr) = self.local_addr() {
            info!("telemetry server listening on {addr}");
        }

        let result = self.accept_loop(&running, &ctx).await;
        if let Err(e) = &result {
            error!("{e}");
        }
        running.store(false, Ordering::Relaxed);

        self.shutdown(broadcaster).await;
        result
    }

    async fn accept_loop(
        &self,
        running: &AtomicBool,
        ctx: &Arc<SessionContext>,
    ) -> Result<(), ServerError> {
        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                return Ok(());
            }

            match timeout(ACCEPT_POLL, self.listener.accept()).await {
                Ok(Ok((stream, peer))) => self.admit(stream, peer, ctx),
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {
                    debug!("accept interrupted; retrying");
                }
                Ok(Err(e)) => return Err(ServerError::Accept(e)),
                Err(_) => {}
            }
        }
    }

    /// Registers a fresh connection and hands it to its own session task.
    fn admit(&self, stream: TcpStream, peer: SocketAddr, ctx: &Arc<SessionContext>) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {peer}: {e}");
        }
        let (reader, writer) = stream.into_split();
        let sink = Arc::new(StreamSink::new(writer, self.config.write_timeout));
        let client = Arc::new(Client::new(peer, sink));

        if !self.registry.add(Arc::clone(&client)) {
            warn!("duplicate client handle for {peer}; dropping connection");
            tokio::spawn(async move { client.close().await });
            return;
        }
        info!("client {peer} connected ({} total)", self.registry.count());

        let ctx = Arc::clone(ctx);
        tokio::spawn(async move {
            run_session(client, reader, &ctx).await;
        });
    }

    async fn shutdown(&self, mut broadcaster: JoinHandle<()>) {
        info!("shutting down");
        match timeout(self.config.shutdown_grace, &mut broadcaster).await {
            Ok(Ok(())) => debug!("broadcaster finished"),
            Ok(Err(e)) => warn!("broadcaster task failed: {e}"),
            Err(_) => {
                warn!(
                    "broadcaster still running after {:?}; aborting it",
                    self.config.shutdown_grace
                );
                broadcaster.abort();
            }
        }

        let remaining = self.registry.drain();
        let count = remaining.len();
        for client in remaining {
            client.close().await;
        }
        info!("closed {count} remaining connection(s)");
    }
}
