//! The outbound half of a connection, as seen by the application layer.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Error type for a failed line write to one client.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection already closed")]
    Closed,
}

/// Trait for writing protocol lines to one connected client.
///
/// The TCP implementation lives in `infrastructure::tcp_sink`; tests use
/// recording doubles.  Implementations must serialize concurrent calls so
/// that a broadcast line and a command response never interleave.
#[async_trait]
pub trait LineSink: Send + Sync {
    /// Writes `line` followed by `\n`.
    async fn send_line(&self, line: &str) -> Result<(), SinkError>;

    /// Shuts the connection down.  Later `send_line` calls fail with
    /// [`SinkError::Closed`].
    async fn close(&self);
}

// ── Test double ───────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod recording {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Records every line and close call; can be told to fail writes.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        lines: Mutex<Vec<String>>,
        closes: AtomicUsize,
        fail_writes: AtomicBool,
    }

    impl RecordingSink {
        pub(crate) fn failing() -> Self {
            let sink = Self::default();
            sink.fail_writes.store(true, Ordering::SeqCst);
            sink
        }

        pub(crate) fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }

        pub(crate) fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LineSink for RecordingSink {
        async fn send_line(&self, line: &str) -> Result<(), SinkError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(SinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "injected failure",
                )));
            }
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
