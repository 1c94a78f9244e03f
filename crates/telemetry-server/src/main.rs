//! Telemetry server, entry point.
//!
//! Streams one simulated vehicle's telemetry to every connected client and
//! lets an authenticated operator steer it.
//!
//! # Usage
//!
//! ```text
//! telemetry-server [OPTIONS] <PORT> [LOG_FILE]
//!
//! Arguments:
//!   <PORT>      TCP port to listen on (1-65535)
//!   [LOG_FILE]  Append log lines to this file as well as to stderr
//!
//! Options:
//!   --bind <ADDR>     Interface address to bind [default: 0.0.0.0]
//!   --config <PATH>   TOML file with tuning knobs and the operator credential
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable           | Default   | Description                  |
//! |--------------------|-----------|------------------------------|
//! | `TELEMETRY_BIND`   | `0.0.0.0` | Interface address to bind    |
//! | `TELEMETRY_CONFIG` | (none)    | Path of the TOML config file |
//! | `RUST_LOG`         | `info`    | Log filter                   |
//!
//! # Exit codes
//!
//! `0` after an orderly Ctrl+C shutdown (or `--help`), `1` on bad arguments,
//! an unreadable config file, or a bind/listen failure.

use std::fs::OpenOptions;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use telemetry_server::domain::ServerConfig;
use telemetry_server::infrastructure::config_store;
use telemetry_server::infrastructure::TelemetryServer;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Concurrent TCP telemetry server.
#[derive(Debug, Parser)]
#[command(
    name = "telemetry-server",
    about = "Streams simulated vehicle telemetry to viewers and accepts operator commands",
    version
)]
struct Cli {
    /// TCP port to listen on.
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Optional append-only log file.
    log_file: Option<PathBuf>,

    /// IP address to bind the listener to.
    ///
    /// `0.0.0.0` accepts connections on every interface; `127.0.0.1` only
    /// from this machine.
    #[arg(long, default_value = "0.0.0.0", env = "TELEMETRY_BIND")]
    bind: IpAddr,

    /// TOML config file.  Without it every setting takes its default.
    #[arg(long, env = "TELEMETRY_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Merges the CLI listen address with the (optional) config file.
    ///
    /// # Errors
    ///
    /// Returns an error if `--config` names a file that cannot be read,
    /// parsed, or validated.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let file = config_store::load_or_default(self.config.as_deref()).with_context(|| {
            format!(
                "failed to load config from {}",
                self.config
                    .as_deref()
                    .map_or_else(|| "<defaults>".into(), |p| p.display().to_string())
            )
        })?;
        Ok(file.into_server_config(SocketAddr::new(self.bind, self.port)))
    }
}

// ── Logging ───────────────────────────────────────────────────────────────────

/// Installs the global subscriber: stderr always, plus `log_file` in append
/// mode when given.
///
/// A log file that cannot be opened is reported and skipped; the server
/// still runs with console logging.
fn init_logging(log_file: Option<&PathBuf>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let mut open_error = None;
    let file_layer = log_file.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                open_error = Some(format!("cannot open log file {}: {e}", path.display()));
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if let Some(message) = open_error {
        warn!("{message}; logging to stderr only");
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    // Bad arguments exit with 1 rather than clap's default of 2.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging(cli.log_file.as_ref());

    match run(cli).await {
        Ok(()) => {
            info!("telemetry server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.into_server_config()?;
    info!(
        "telemetry server starting: bind={} period={:?} backlog={}",
        config.bind_addr, config.telemetry_period, config.backlog
    );

    let server = TelemetryServer::bind(config)?;

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    server.run(running).await?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn test_cli_port_is_required() {
        let result = Cli::try_parse_from(["telemetry-server"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_port_only() {
        // Arrange / Act
        let cli = Cli::try_parse_from(["telemetry-server", "9000"]).unwrap();

        // Assert
        assert_eq!(cli.port, 9000);
        assert!(cli.log_file.is_none());
    }

    #[test]
    fn test_cli_port_and_log_file() {
        let cli = Cli::try_parse_from(["telemetry-server", "9000", "server.log"]).unwrap();
        assert_eq!(cli.log_file, Some(PathBuf::from("server.log")));
    }

    #[test]
    fn test_cli_rejects_port_zero() {
        let err = Cli::try_parse_from(["telemetry-server", "0"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_rejects_non_numeric_port() {
        let err = Cli::try_parse_from(["telemetry-server", "http"]).unwrap_err();
        assert!(err.use_stderr());
    }

    #[test]
    fn test_cli_rejects_out_of_range_port() {
        assert!(Cli::try_parse_from(["telemetry-server", "70000"]).is_err());
    }

    #[test]
    fn test_cli_help_is_not_an_error_exit() {
        let err = Cli::try_parse_from(["telemetry-server", "--help"]).unwrap_err();
        assert!(!err.use_stderr());
    }

    #[test]
    fn test_cli_bind_override() {
        let cli = Cli::try_parse_from(["telemetry-server", "--bind", "127.0.0.1", "9000"]).unwrap();
        assert_eq!(cli.bind.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_into_server_config_without_file_uses_defaults() {
        let cli = Cli {
            port: 9100,
            log_file: None,
            bind: "127.0.0.1".parse().unwrap(),
            config: None,
        };

        let config = cli.into_server_config().unwrap();

        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9100");
        assert_eq!(config.telemetry_period, Duration::from_secs(10));
    }

    #[test]
    fn test_into_server_config_missing_file_is_error() {
        let cli = Cli {
            port: 9100,
            log_file: None,
            bind: "0.0.0.0".parse().unwrap(),
            config: Some(PathBuf::from("/nonexistent/telemetry.toml")),
        };

        assert!(cli.into_server_config().is_err());
    }
}
