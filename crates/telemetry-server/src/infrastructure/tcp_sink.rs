//! [`LineSink`] over any async byte writer (the write half of a TCP stream in
//! production, an in-memory duplex pipe in tests).

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::application::sink::{LineSink, SinkError};

/// Serialized, time-bounded line writer.
///
/// The writer sits behind a `tokio::sync::Mutex` so the session task and the
/// broadcaster never interleave bytes of two lines.  `None` means closed.
pub struct StreamSink<W> {
    writer: Mutex<Option<W>>,
    write_timeout: Duration,
}

impl<W> StreamSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W, write_timeout: Duration) -> Self {
        Self {
            writer: Mutex::new(Some(writer)),
            write_timeout,
        }
    }
}

#[async_trait]
impl<W> LineSink for StreamSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send_line(&self, line: &str) -> Result<(), SinkError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SinkError::Closed)?;

        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(b'\n');

        let write = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        };
        match timeout(self.write_timeout, write).await {
            Ok(result) => result.map_err(SinkError::from),
            Err(_) => Err(SinkError::Timeout(self.write_timeout)),
        }
    }

    async fn close(&self) {
        let Some(mut writer) = self.writer.lock().await.take() else {
            return;
        };
        // The peer may already be gone; a failed FIN is not worth reporting.
        if let Err(e) = timeout(self.write_timeout, writer.shutdown()).await {
            debug!("shutdown timed out: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_send_line_appends_newline() {
        // Arrange
        let (client, mut server) = tokio::io::duplex(256);
        let sink = StreamSink::new(client, Duration::from_secs(1));

        // Act
        sink.send_line("OK bye").await.unwrap();
        sink.close().await;

        // Assert
        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "OK bye\n");
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (client, _server) = tokio::io::duplex(256);
        let sink = StreamSink::new(client, Duration::from_secs(1));

        sink.close().await;

        assert!(matches!(sink.send_line("x").await, Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn test_close_twice_is_harmless() {
        let (client, _server) = tokio::io::duplex(256);
        let sink = StreamSink::new(client, Duration::from_secs(1));
        sink.close().await;
        sink.close().await;
    }

    #[tokio::test]
    async fn test_write_to_dropped_peer_is_io_error() {
        let (client, server) = tokio::io::duplex(256);
        let sink = StreamSink::new(client, Duration::from_secs(1));
        drop(server);

        assert!(matches!(sink.send_line("DATA").await, Err(SinkError::Io(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_peer_times_out() {
        // Arrange: an 8-byte pipe nobody reads fills up immediately.
        let (client, _server) = tokio::io::duplex(8);
        let sink = StreamSink::new(client, Duration::from_millis(50));

        // Act
        let result = sink.send_line(&"x".repeat(64)).await;

        // Assert
        assert!(matches!(result, Err(SinkError::Timeout(_))));
    }
}
