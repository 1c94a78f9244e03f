//! Connected sessions and the registry that tracks them.
//!
//! # Ownership
//!
//! A [`Client`] is created by the acceptor and owned, for the life of the
//! connection, by its session task.  The [`ClientRegistry`] and the
//! broadcaster only hold extra `Arc` references so they can reach the
//! client's socket.
//!
//! # Removal and close, exactly once
//!
//! Two paths end a client: its session exits, or a broadcast write to it
//! fails.  Both call [`ClientRegistry::remove`], which hands the entry back
//! to exactly one caller; that caller then calls [`Client::close`].  A
//! second `remove` of the same id is a no-op returning `None`, and
//! `Client::close` is itself guarded so the socket is shut down at most once
//! even if a caller closes without going through the registry.
//!
//! # Locking
//!
//! The registry's mutex guards membership only.  It is never held across an
//! `.await`, a socket write, or a vehicle-state access: every read path
//! copies the `Arc`s it needs and releases the lock before doing anything
//! else.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use telemetry_core::protocol::messages::DEFAULT_NAME;
use telemetry_core::{Role, ServerLine, UserEntry};
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use crate::application::sink::{LineSink, SinkError};

/// Opaque connection handle; the registry key.
pub type ClientId = Uuid;

#[derive(Debug)]
struct SessionAttrs {
    name: String,
    role: Role,
}

/// One accepted connection.
pub struct Client {
    id: ClientId,
    peer: SocketAddr,
    attrs: Mutex<SessionAttrs>,
    alive: AtomicBool,
    closed: AtomicBool,
    close_signal: Notify,
    sink: Arc<dyn LineSink>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// A fresh `VIEWER` session named `anon`, alive.
    pub fn new(peer: SocketAddr, sink: Arc<dyn LineSink>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            attrs: Mutex::new(SessionAttrs {
                name: DEFAULT_NAME.to_string(),
                role: Role::Viewer,
            }),
            alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
            sink,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn name(&self) -> String {
        self.attrs().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.attrs().name = name.into();
    }

    pub fn role(&self) -> Role {
        self.attrs().role
    }

    pub fn set_role(&self, role: Role) {
        self.attrs().role = role;
    }

    /// Whether the client is still eligible for broadcasts.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Writes one protocol line to this client.
    pub async fn send(&self, line: &ServerLine) -> Result<(), SinkError> {
        let text = line.to_string();
        self.sink.send_line(&text).await?;
        debug!("TX {} {text}", self.peer);
        Ok(())
    }

    /// Marks the client dead, shuts its socket down (first call only), and
    /// wakes the session task if it is blocked reading.
    pub async fn close(&self) {
        self.mark_dead();
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.sink.close().await;
            debug!("client {} connection closed", self.peer);
        }
        // A stored permit wakes the session even if it is not waiting yet.
        self.close_signal.notify_one();
    }

    /// Resolves once [`Client::close`] has been called.
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.close_signal.notified().await;
    }

    fn attrs(&self) -> MutexGuard<'_, SessionAttrs> {
        self.attrs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

struct Entry {
    seq: u64,
    client: Arc<Client>,
}

/// Thread-safe set of connected clients, keyed by [`ClientId`].
///
/// Iteration order of the underlying map is irrelevant; snapshots are
/// returned in registration order so `USERS` output is stable.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, Entry>>,
    next_seq: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client.  Returns `false` (and changes nothing) if a client
    /// with the same id is already present.
    pub fn add(&self, client: Arc<Client>) -> bool {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut clients = self.lock();
        if clients.contains_key(&client.id()) {
            return false;
        }
        clients.insert(client.id(), Entry { seq, client });
        true
    }

    /// Removes a client by handle, handing it back to the caller.
    ///
    /// Returns `None` if the client was already removed; safe to call twice.
    pub fn remove(&self, id: ClientId) -> Option<Arc<Client>> {
        self.lock().remove(&id).map(|entry| entry.client)
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Copies every client, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Client>> {
        let mut entries: Vec<(u64, Arc<Client>)> = self
            .lock()
            .values()
            .map(|e| (e.seq, Arc::clone(&e.client)))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, c)| c).collect()
    }

    /// Copies the clients whose liveness flag is set at snapshot time.
    ///
    /// Callers iterate the returned list after the lock is gone, so a slow
    /// write to one client never blocks registry mutation for others.
    pub fn snapshot_live(&self) -> Vec<Arc<Client>> {
        self.snapshot().into_iter().filter(|c| c.is_alive()).collect()
    }

    /// Runs `f` once per live client, outside the registry lock.
    pub fn for_each_live(&self, mut f: impl FnMut(&Arc<Client>)) {
        for client in self.snapshot_live() {
            f(&client);
        }
    }

    /// `USERS` rows: (address, port, role, name) per client, in order.
    pub fn list_snapshot(&self) -> Vec<UserEntry> {
        self.snapshot()
            .iter()
            .enumerate()
            .map(|(index, c)| UserEntry {
                index,
                address: c.peer().ip().to_string(),
                port: c.peer().port(),
                role: c.role(),
                name: c.name(),
            })
            .collect()
    }

    /// Empties the registry, returning every client that was still present.
    pub fn drain(&self) -> Vec<Arc<Client>> {
        let mut entries: Vec<Entry> = self.lock().drain().map(|(_, e)| e).collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.client).collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClientId, Entry>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
