//! Line-level message types for the telemetry protocol (PROTO 1.0).
//!
//! # Client → server
//!
//! ```text
//! HELLO <name>          set display name          any role
//! AUTH <user> <pass>    upgrade to ADMIN           any role
//! CMD <subcommand>      SPEED_UP | SLOW_DOWN |     ADMIN
//!                       TURN_LEFT | TURN_RIGHT
//! USERS                 list connected sessions    ADMIN
//! BYE                   close the session          any role
//! ```
//!
//! Verbs are case-insensitive; surrounding whitespace is ignored.
//!
//! # Server → client
//!
//! ```text
//! WELCOME TelemetryServer PROTO 1.0
//! ROLE VIEWER | ROLE ADMIN
//! OK hello <name> | OK auth | OK bye | OK users
//! ACK <cmd> accepted | NACK <reason>
//! ERROR <code> <reason>
//! USERS count=<n>
//! USER <idx> ip=<addr> port=<port> role=<role> name=<name>
//! DATA speed=<f1> battery=<f1> temp=<f1> heading=<f1> ts=<epoch-ms>
//! ```

use std::fmt;

use crate::domain::vehicle::VehicleSnapshot;

/// Server name announced in the welcome banner.
pub const SERVER_NAME: &str = "TelemetryServer";
/// Protocol version announced in the welcome banner.
pub const PROTO_VERSION: &str = "1.0";
/// Display names longer than this many characters are truncated.
pub const MAX_NAME_CHARS: usize = 63;
/// Display name every session starts with.
pub const DEFAULT_NAME: &str = "anon";

/// Session privilege level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Viewer,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Viewer => "VIEWER",
            Role::Admin => "ADMIN",
        })
    }
}

// ── Client requests ───────────────────────────────────────────────────────────

/// One parsed client line.
///
/// Missing arguments are kept as `None` rather than rejected here: whether a
/// missing argument is an error, and which error, is the dispatcher's call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Hello { name: Option<String> },
    Auth { user: Option<String>, pass: Option<String> },
    Cmd { subcommand: Option<String> },
    Users,
    Bye,
    Unknown { verb: String },
}

impl Request {
    /// Parses one line (terminators already stripped).
    ///
    /// Returns `None` for blank lines, which the session ignores.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let (verb, rest) = split_token(line);

        let request = match verb.to_ascii_uppercase().as_str() {
            "HELLO" => Request::Hello {
                name: non_empty(rest).map(|n| n.chars().take(MAX_NAME_CHARS).collect()),
            },
            "AUTH" => {
                let (user, pass) = split_token(rest);
                Request::Auth {
                    user: non_empty(user),
                    pass: non_empty(pass),
                }
            }
            "CMD" => Request::Cmd {
                subcommand: non_empty(rest),
            },
            "USERS" => Request::Users,
            "BYE" => Request::Bye,
            _ => Request::Unknown {
                verb: verb.to_string(),
            },
        };
        Some(request)
    }

    /// Short verb name for log messages.
    ///
    /// Logging the whole request would write operator passwords to the log
    /// file, so session logs use this instead for `AUTH`.
    pub fn verb(&self) -> &'static str {
        match self {
            Request::Hello { .. } => "HELLO",
            Request::Auth { .. } => "AUTH",
            Request::Cmd { .. } => "CMD",
            Request::Users => "USERS",
            Request::Bye => "BYE",
            Request::Unknown { .. } => "UNKNOWN",
        }
    }
}

/// Splits off the first whitespace-delimited token; the remainder is trimmed.
fn split_token(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (s, ""),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

// ── Server lines ──────────────────────────────────────────────────────────────

/// Numeric class of an `ERROR` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// 400: malformed or unknown request.
    BadRequest,
    /// 401: bad credentials.
    Unauthorized,
    /// 403: role too low for the request.
    Forbidden,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        match self {
            ErrorCode::BadRequest => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
        }
    }
}

/// One row of a `USERS` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub index: usize,
    pub address: String,
    pub port: u16,
    pub role: Role,
    pub name: String,
}

/// One line sent from the server to a client, without its terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerLine {
    Welcome,
    Role(Role),
    HelloOk { name: String },
    AuthOk,
    Ack { command: String },
    Nack { reason: &'static str },
    Error { code: ErrorCode, reason: &'static str },
    UsersHeader { count: usize },
    User(UserEntry),
    UsersEnd,
    Bye,
    Data { snapshot: VehicleSnapshot, timestamp_ms: u64 },
}

impl ServerLine {
    pub fn unknown_command() -> Self {
        Self::Error { code: ErrorCode::BadRequest, reason: "unknown_command" }
    }

    pub fn invalid_cmd() -> Self {
        Self::Error { code: ErrorCode::BadRequest, reason: "invalid_cmd" }
    }

    pub fn line_too_long() -> Self {
        Self::Error { code: ErrorCode::BadRequest, reason: "line_too_long" }
    }

    pub fn invalid_encoding() -> Self {
        Self::Error { code: ErrorCode::BadRequest, reason: "invalid_encoding" }
    }

    pub fn invalid_credentials() -> Self {
        Self::Error { code: ErrorCode::Unauthorized, reason: "invalid_credentials" }
    }

    pub fn not_admin() -> Self {
        Self::Error { code: ErrorCode::Forbidden, reason: "not_admin" }
    }
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerLine::Welcome => write!(f, "WELCOME {SERVER_NAME} PROTO {PROTO_VERSION}"),
            ServerLine::Role(role) => write!(f, "ROLE {role}"),
            ServerLine::HelloOk { name } => write!(f, "OK hello {name}"),
            ServerLine::AuthOk => f.write_str("OK auth"),
            ServerLine::Ack { command } => write!(f, "ACK {command} accepted"),
            ServerLine::Nack { reason } => write!(f, "NACK {reason}"),
            ServerLine::Error { code, reason } => write!(f, "ERROR {} {reason}", code.as_u16()),
            ServerLine::UsersHeader { count } => write!(f, "USERS count={count}"),
            ServerLine::User(u) => write!(
                f,
                "USER {} ip={} port={} role={} name={}",
                u.index, u.address, u.port, u.role, u.name
            ),
            ServerLine::UsersEnd => f.write_str("OK users"),
            ServerLine::Bye => f.write_str("OK bye"),
            ServerLine::Data { snapshot, timestamp_ms } => write!(
                f,
                "DATA speed={:.1} battery={:.1} temp={:.1} heading={:.1} ts={}",
                snapshot.speed_kmh,
                snapshot.battery_pct,
                snapshot.temp_c,
                snapshot.heading_deg,
                timestamp_ms
            ),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
