//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup from the CLI (listen address) and an optional
//! TOML file (tuning knobs and the operator credential), then wrapped in an
//! `Arc` and shared by every task.
//!
//! # Config file
//!
//! Every field is optional; a missing file section or key falls back to the
//! default listed below.
//!
//! ```toml
//! [server]
//! backlog = 16
//! max_line_len = 1024
//! telemetry_period_secs = 10
//! write_timeout_ms = 5000
//! shutdown_grace_ms = 2000
//!
//! [operator]
//! username = "admin"
//! password = "1234"
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but makes no sense (e.g. a zero telemetry period).
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// The single operator identity allowed to become `ADMIN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: default_password(),
        }
    }
}

impl Credentials {
    /// Case-insensitive match on both user and password.
    pub fn matches(&self, user: &str, pass: &str) -> bool {
        self.username.eq_ignore_ascii_case(user) && self.password.eq_ignore_ascii_case(pass)
    }
}

/// All runtime configuration for the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: SocketAddr,
    /// Pending-connection queue length passed to `listen()`.
    pub backlog: u32,
    /// Longest accepted client line in bytes, excluding the terminator.
    pub max_line_len: usize,
    /// Time between two telemetry broadcasts.
    pub telemetry_period: Duration,
    /// Upper bound on a single line write to one client.
    pub write_timeout: Duration,
    /// How long shutdown waits for the broadcaster before aborting it.
    pub shutdown_grace: Duration,
    /// Operator credential for `AUTH`.
    pub operator: Credentials,
}

impl Default for ServerConfig {
    /// | Field             | Default        |
    /// |-------------------|----------------|
    /// | bind_addr         | `0.0.0.0:9000` |
    /// | backlog           | 16             |
    /// | max_line_len      | 1024           |
    /// | telemetry_period  | 10 s           |
    /// | write_timeout     | 5 s            |
    /// | shutdown_grace    | 2 s            |
    /// | operator          | admin / 1234   |
    fn default() -> Self {
        ConfigFile::default().into_server_config(SocketAddr::from(([0, 0, 0, 0], 9000)))
    }
}

// ── Config file schema ────────────────────────────────────────────────────────

/// On-disk configuration, as read from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub operator: Credentials,
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
    #[serde(default = "default_telemetry_period_secs")]
    pub telemetry_period_secs: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            backlog: default_backlog(),
            max_line_len: default_max_line_len(),
            telemetry_period_secs: default_telemetry_period_secs(),
            write_timeout_ms: default_write_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl ConfigFile {
    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML, [`ConfigError::Invalid`]
    /// for values that parse but cannot work (zero-length lines, a zero
    /// telemetry period, an empty operator name).
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_line_len == 0 {
            return Err(ConfigError::Invalid("server.max_line_len must be > 0".into()));
        }
        if self.server.telemetry_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.telemetry_period_secs must be > 0".into(),
            ));
        }
        if self.server.backlog == 0 {
            return Err(ConfigError::Invalid("server.backlog must be > 0".into()));
        }
        if self.operator.username.trim().is_empty() {
            return Err(ConfigError::Invalid("operator.username must not be empty".into()));
        }
        Ok(())
    }

    /// Combines the file settings with the listen address from the CLI.
    pub fn into_server_config(self, bind_addr: SocketAddr) -> ServerConfig {
        ServerConfig {
            bind_addr,
            backlog: self.server.backlog,
            max_line_len: self.server.max_line_len,
            telemetry_period: Duration::from_secs(self.server.telemetry_period_secs),
            write_timeout: Duration::from_millis(self.server.write_timeout_ms),
            shutdown_grace: Duration::from_millis(self.server.shutdown_grace_ms),
            operator: self.operator,
        }
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_username() -> String {
    "admin".to_string()
}
fn default_password() -> String {
    "1234".to_string()
}
fn default_backlog() -> u32 {
    16
}
fn default_max_line_len() -> usize {
    telemetry_core::protocol::DEFAULT_MAX_LINE_LEN
}
fn default_telemetry_period_secs() -> u64 {
    10
}
fn default_write_timeout_ms() -> u64 {
    5_000
}
fn default_shutdown_grace_ms() -> u64 {
    2_000
}

// ── Tests ─────────────────────────────────────────────────────────────────────
