//! # telemetry-core
//!
//! Shared library for the telemetry server containing the vehicle model, the
//! drift rules that simulate natural variation, and the line-oriented wire
//! protocol.
//!
//! It has zero dependencies on sockets, async runtimes, or locks: every type
//! here is plain data plus pure functions, so the rules can be tested
//! exhaustively without a network.
//!
//! # Architecture overview
//!
//! The telemetry server observes and controls one simulated vehicle.  Viewers
//! connect over TCP and receive a `DATA ...` line every telemetry period;
//! operators authenticate and send control commands that change the vehicle.
//!
//! - **`domain`** – The [`VehicleState`] record with its invariants (speed,
//!   battery, and temperature are clamped; heading wraps modulo 360), the
//!   discrete operator commands, and the randomized drift step.
//!
//! - **`protocol`** – How lines travel over the network: parsing client
//!   requests, formatting server lines, and splitting a byte stream into
//!   bounded lines.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `telemetry_core::VehicleState` instead of the full module path.
pub use domain::drift::{DriftSource, DriftStep, RandomDrift};
pub use domain::vehicle::{CommandOutcome, VehicleCommand, VehicleSnapshot, VehicleState};
pub use protocol::framing::{LineFramer, ProtocolError};
pub use protocol::messages::{Request, Role, ServerLine, UserEntry};
