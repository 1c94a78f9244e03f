//! Newline framing for the byte stream of one connection.
//!
//! TCP is a stream protocol: one `read()` may return half a line, or several
//! lines at once.  [`LineFramer`] accumulates bytes across reads and hands
//! back complete lines one at a time.
//!
//! # Bounded memory
//!
//! A peer that never sends `\n` must not make the buffer grow without limit.
//! Once more than `max_len` bytes are pending without a terminator, the
//! framer drops them and enters *discard mode*: everything up to and
//! including the next `\n` is thrown away, then a single
//! [`ProtocolError::LineTooLong`] is reported in place of the oversized line.
//! Framing resumes cleanly with the byte after that `\n`.
//!
//! Each session owns its own framer; there is no shared buffer state.

use thiserror::Error;

/// Default maximum line length in bytes, excluding the terminator.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024;

/// Errors reported in place of a line that could not be framed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line exceeded the framer's maximum length and was discarded.
    #[error("line exceeds {max} bytes and was discarded")]
    LineTooLong { max: usize },

    /// The line was not valid UTF-8.
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

/// Splits an incoming byte stream into bounded, terminator-free lines.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_len: usize,
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

impl LineFramer {
    /// Creates a framer that accepts lines of at most `max_len` bytes.
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_len.min(4096)),
            max_len,
            discarding: false,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Number of bytes currently buffered (never more than `max_len`, plus
    /// whatever a single `push` appended before the next `next_line`).
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Appends bytes received from the socket.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns the next complete line, if one is buffered.
    ///
    /// `None` means more bytes are needed.  `Some(Err(_))` reports a line
    /// that was dropped; the caller should answer it and keep reading.
    pub fn next_line(&mut self) -> Option<Result<String, ProtocolError>> {
        let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
            // Allow one extra byte for a trailing '\r' still waiting on its '\n'.
            if self.buf.len() > self.max_len + 1 {
                self.buf.clear();
                self.discarding = true;
            } else if self.discarding {
                self.buf.clear();
            }
            return None;
        };

        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop(); // '\n'
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        if std::mem::take(&mut self.discarding) || line.len() > self.max_len {
            return Some(Err(ProtocolError::LineTooLong { max: self.max_len }));
        }
        Some(String::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
