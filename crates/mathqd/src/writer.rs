//! Shared output channel for a session.
//!
//! A session's socket write half is written by two producers: the session
//! task itself (ACK and protocol ERR lines) and the evaluation worker (RES
//! and evaluation ERR lines). Both go through the same `SessionWriter`,
//! which serializes whole lines behind an async mutex.
//!
//! The first failed or timed-out write marks the channel broken. Later
//! sends fail immediately with `WriteError::Broken`, so a peer that stops
//! reading costs the evaluation worker one `write_timeout` in total, not
//! one per queued reply. The owning session waits on
//! [`SessionWriter::broken`] and ends itself.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Write failures and timeouts are returned as `WriteError`

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use mathq_protocol::Response;

/// Type-erased write half (a TCP `OwnedWriteHalf` in production).
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Cheap-to-clone handle to a session's output channel.
#[derive(Clone)]
pub struct SessionWriter {
    inner: Arc<Mutex<BufWriter<BoxedWrite>>>,
    write_timeout: Duration,
    broken: CancellationToken,
}

impl SessionWriter {
    /// Wraps a write half. Every `send` must complete within `write_timeout`.
    pub fn new<W>(writer: W, write_timeout: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: BoxedWrite = Box::new(writer);
        Self {
            inner: Arc::new(Mutex::new(BufWriter::new(boxed))),
            write_timeout,
            broken: CancellationToken::new(),
        }
    }

    /// Writes one response line and flushes it.
    ///
    /// Fails at once if an earlier write on this channel failed.
    pub async fn send(&self, response: &Response) -> Result<(), WriteError> {
        if self.is_broken() {
            return Err(WriteError::Broken);
        }

        let line = format!("{response}\n");
        let mut writer = self.inner.lock().await;

        // Another sender may have broken the channel while we waited.
        if self.is_broken() {
            return Err(WriteError::Broken);
        }

        let result = match timeout(self.write_timeout, async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => WriteError::Io(e.to_string()),
            Err(_) => WriteError::Timeout(self.write_timeout),
        };

        self.broken.cancel();
        Err(result)
    }

    /// Flushes and closes the write half. Errors are ignored; the peer may
    /// already be gone.
    ///
    /// A broken channel is not flushed: a partially written line is
    /// discarded when the last handle is dropped.
    pub async fn shutdown(&self) {
        if self.is_broken() {
            return;
        }
        let mut writer = self.inner.lock().await;
        let _ = timeout(self.write_timeout, writer.shutdown()).await;
    }

    /// Returns `true` once a write on this channel has failed.
    pub fn is_broken(&self) -> bool {
        self.broken.is_cancelled()
    }

    /// Completes when a write on this channel fails.
    pub async fn broken(&self) {
        self.broken.cancelled().await;
    }

    /// Returns `true` if both handles refer to the same output channel.
    pub fn same_channel(&self, other: &SessionWriter) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SessionWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionWriter")
            .field("write_timeout", &self.write_timeout)
            .field("broken", &self.is_broken())
            .finish_non_exhaustive()
    }
}

/// Errors that can occur while writing to a session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Write timed out after {0:?}")]
    Timeout(Duration),

    #[error("Output channel broken by an earlier failed write")]
    Broken,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn test_send_writes_line() {
        let (client, server) = duplex(1024);
        let writer = SessionWriter::new(server, Duration::from_secs(1));

        writer.send(&Response::welcome("alice")).await.unwrap();
        writer.send(&Response::result("alice", "11")).await.unwrap();

        let mut lines = BufReader::new(client).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "ACK:alice:Welcome");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "RES:alice:11");
    }

    #[tokio::test]
    async fn test_send_to_closed_peer_fails() {
        let (client, server) = duplex(64);
        drop(client);
        let writer = SessionWriter::new(server, Duration::from_secs(1));

        let result = writer.send(&Response::busy()).await;
        assert!(matches!(result, Err(WriteError::Io(_))));
    }

    #[tokio::test]
    async fn test_send_times_out_when_peer_stops_reading() {
        // Buffer smaller than the line and nobody reading.
        let (_client, server) = duplex(4);
        let writer = SessionWriter::new(server, Duration::from_millis(50));

        let result = writer.send(&Response::result("alice", "123456789")).await;
        assert!(matches!(result, Err(WriteError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_failed_write_breaks_channel_for_all_clones() {
        let (_client, server) = duplex(4);
        let writer = SessionWriter::new(server, Duration::from_millis(50));
        let clone = writer.clone();
        assert!(!clone.is_broken());

        let result = writer.send(&Response::result("alice", "123456789")).await;
        assert!(matches!(result, Err(WriteError::Timeout(_))));
        assert!(clone.is_broken());

        // Later sends fail without waiting out another timeout.
        let started = tokio::time::Instant::now();
        let result = clone.send(&Response::result("alice", "1")).await;
        assert!(matches!(result, Err(WriteError::Broken)));
        assert!(started.elapsed() < Duration::from_millis(50));

        // Resolves immediately once broken.
        tokio::time::timeout(Duration::from_secs(1), clone.broken())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_broken_channel_drops_partial_line() {
        let (client, server) = duplex(8);
        let writer = SessionWriter::new(server, Duration::from_millis(50));

        let result = writer.send(&Response::result("alice", "1234567890")).await;
        assert!(matches!(result, Err(WriteError::Timeout(_))));

        writer.shutdown().await;
        drop(writer);

        // Only what fit in the pipe before the timeout reaches the peer;
        // the rest of the line is never flushed.
        let mut received = Vec::new();
        let mut client = client;
        tokio::io::AsyncReadExt::read_to_end(&mut client, &mut received)
            .await
            .unwrap();
        assert!(received.len() <= 8);
        assert!(!received.ends_with(b"\n"));
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let (_client, server) = duplex(64);
        let writer = SessionWriter::new(server, Duration::from_secs(1));
        let clone = writer.clone();
        assert!(writer.same_channel(&clone));

        let (_other_client, other_server) = duplex(64);
        let other = SessionWriter::new(other_server, Duration::from_secs(1));
        assert!(!writer.same_channel(&other));
    }
}
