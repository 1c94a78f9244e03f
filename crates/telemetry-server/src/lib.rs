//! telemetry-server library crate.
//!
//! A long-lived TCP service that streams simulated vehicle telemetry to many
//! connected viewers and accepts control commands from authenticated
//! operators.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Viewers / operators (line protocol over TCP)
//!         ↕
//! [telemetry-server]
//!   ├── domain/           ServerConfig, operator credentials, config file schema
//!   ├── application/      Client registry, shared vehicle, command dispatcher
//!   └── infrastructure/
//!         ├── server/      Acceptor + shutdown sequence
//!         ├── session/     Per-connection read loop
//!         ├── broadcaster/ Periodic drift + telemetry fan-out
//!         └── tcp_sink/    Serialized line writes to one socket
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` owns the shared state and the protocol decisions; it only
//!   talks to sockets through the [`application::LineSink`] trait.
//! - `infrastructure` owns tokio tasks, sockets, and timers.
//!
//! # Shared state
//!
//! Exactly two shared objects exist: the [`application::ClientRegistry`] and
//! the [`application::SharedVehicle`].  Each has its own lock, each lock is
//! held only for an in-memory copy or mutation, and no code path ever holds
//! both at once.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: registry, vehicle handle, dispatcher.
pub mod application;

/// Infrastructure layer: acceptor, sessions, broadcaster, socket sinks.
pub mod infrastructure;
