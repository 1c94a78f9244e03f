//! Infrastructure layer for telemetry-server.
//!
//! All I/O lives here: the listening socket, per-connection session tasks,
//! socket writers, the broadcast timer, and reading the config file.
//!
//! # What does NOT belong here?
//!
//! - Deciding what a request means (that is the application layer)
//! - Vehicle rules and line formats (that is `telemetry-core`)

pub mod broadcaster;
pub mod config_store;
pub mod server;
pub mod session;
pub mod tcp_sink;

pub use broadcaster::{BroadcastReport, Broadcaster};
pub use server::{ServerError, TelemetryServer};
pub use session::{run_session, SessionContext, SessionEnd};
pub use tcp_sink::StreamSink;
