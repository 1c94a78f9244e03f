//! Protocol module containing request/response line types and the line framer.
//!
//! Wire format: UTF-8 text, one command or event per line, terminated by
//! `\n`.  A `\r` before the `\n` is tolerated and stripped.

pub mod framing;
pub mod messages;

pub use framing::{LineFramer, ProtocolError, DEFAULT_MAX_LINE_LEN};
pub use messages::*;
