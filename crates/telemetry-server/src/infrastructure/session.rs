//! Per-connection session task.
//!
//! # Lifecycle
//!
//! ```text
//!  Connected ──► welcome sent ──► read / dispatch / reply loop ──► exit path
//!                    │                        │                        │
//!              write fails              EOF, read error,        mark dead,
//!                    │                  BYE, write fails,       remove from
//!                    └───────────────►  or client closed ─────► registry,
//!                                                                close socket
//! ```
//!
//! Every way out of [`run_session`] goes through the same exit path, so the
//! registry entry is removed and the socket closed exactly once no matter
//! which condition ended the session.
//!
//! # Framing
//!
//! Bytes go through a [`LineFramer`], so partial reads are buffered and an
//! oversized line is discarded (answered with `ERROR 400 line_too_long`)
//! instead of growing the buffer.  Blank lines are ignored.

use std::io;
use std::sync::Arc;

use telemetry_core::{LineFramer, ProtocolError, Request, Role, ServerLine};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::application::dispatcher::{Dispatcher, Reply};
use crate::application::registry::{Client, ClientRegistry};

const READ_CHUNK: usize = 1024;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Zero-length read: the peer closed its side.
    PeerClosed,
    /// The client sent `BYE`.
    Bye,
    /// The socket reported an error while reading.
    ReadError(io::ErrorKind),
    /// A reply (or the welcome banner) could not be written.
    WriteFailed,
    /// The client was closed from elsewhere (failed broadcast, shutdown).
    Cancelled,
}

/// Shared collaborators every session needs.
pub struct SessionContext {
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<ClientRegistry>,
    pub max_line_len: usize,
}

/// Runs one client session to completion, then performs the exit path.
pub async fn run_session<R>(client: Arc<Client>, reader: R, ctx: &SessionContext) -> SessionEnd
where
    R: AsyncRead + Unpin,
{
    let end = serve(&client, reader, ctx).await;

    client.mark_dead();
    if ctx.registry.remove(client.id()).is_none() {
        debug!("client {} was already removed", client.peer());
    }
    client.close().await;

    match end {
        SessionEnd::ReadError(kind) => warn!("client {} read error: {kind:?}", client.peer()),
        other => info!("client {} ({}) disconnected: {other:?}", client.peer(), client.name()),
    }
    end
}

async fn serve<R>(client: &Client, mut reader: R, ctx: &SessionContext) -> SessionEnd
where
    R: AsyncRead + Unpin,
{
    for line in [ServerLine::Welcome, ServerLine::Role(Role::Viewer)] {
        if client.send(&line).await.is_err() {
            return SessionEnd::WriteFailed;
        }
    }

    let mut framer = LineFramer::new(ctx.max_line_len);
    let mut buf = [0u8; READ_CHUNK];

    loop {
        while let Some(next) = framer.next_line() {
            let replies = match next {
                Ok(line) => {
                    let Some(request) = Request::parse(&line) else {
                        continue;
                    };
                    debug!("RX {} {}", client.peer(), request.verb());
                    ctx.dispatcher.dispatch(client, request)
                }
                Err(e) => {
                    debug!("client {} sent a bad line: {e}", client.peer());
                    let line = match e {
                        ProtocolError::LineTooLong { .. } => ServerLine::line_too_long(),
                        ProtocolError::InvalidUtf8 => ServerLine::invalid_encoding(),
                    };
                    Reply {
                        lines: vec![line],
                        close: false,
                    }
                }
            };

            for line in &replies.lines {
                if client.send(line).await.is_err() {
                    return SessionEnd::WriteFailed;
                }
            }
            if replies.close {
                return SessionEnd::Bye;
            }
        }

        let read = tokio::select! {
            read = reader.read(&mut buf) => read,
            () = client.closed() => return SessionEnd::Cancelled,
        };

        match read {
            Ok(0) => return SessionEnd::PeerClosed,
            Ok(n) => framer.push(&buf[..n]),
            Err(e) => return SessionEnd::ReadError(e.kind()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
