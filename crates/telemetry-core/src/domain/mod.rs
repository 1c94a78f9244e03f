//! Domain entities for the simulated vehicle.
//!
//! Nothing in this module performs I/O or takes a lock.  The server wraps
//! [`vehicle::VehicleState`] in a mutex and is the only place that decides
//! *when* a mutation happens; this module decides *what* a mutation does.

pub mod drift;
pub mod vehicle;
