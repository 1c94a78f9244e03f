//! Domain layer for telemetry-server.
//!
//! Plain configuration types.  Nothing here touches the file system, the
//! environment, or a socket; the binary and the infrastructure layer fill
//! these structs in.

pub mod config;

pub use config::{ConfigError, ConfigFile, Credentials, ServerConfig, ServerSection};
