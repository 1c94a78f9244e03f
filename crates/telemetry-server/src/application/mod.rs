//! Application layer for telemetry-server.
//!
//! Knows *what* happens to the shared state and *which* lines a client gets
//! back; delegates *how* bytes reach a socket to the infrastructure layer via
//! the [`LineSink`] trait.
//!
//! # Responsibilities
//!
//! - Tracking connected sessions ([`ClientRegistry`], [`Client`])
//! - Guarding the single vehicle record ([`SharedVehicle`])
//! - Interpreting one client request ([`Dispatcher`])
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or spawning tasks
//! - Timers and the broadcast period
//! - Line framing of the raw byte stream (that is `telemetry-core`)

pub mod dispatcher;
pub mod registry;
pub mod sink;
pub mod vehicle;

pub use dispatcher::{Dispatcher, Reply};
pub use registry::{Client, ClientId, ClientRegistry};
pub use sink::{LineSink, SinkError};
pub use vehicle::SharedVehicle;
