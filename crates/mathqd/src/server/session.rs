//! Session handler for individual client connections.
//!
//! Each accepted connection gets its own `SessionHandler` that:
//! - Reads one protocol line at a time, bounded in length and idle time
//! - Walks the `AwaitingJoin → Joined` states; termination consumes the
//!   handler and is reported as a [`SessionEnd`]
//! - Registers the client name and pushes `CALC` requests onto the queue
//! - Ends itself when its output channel breaks
//! - Deregisters the client exactly once on every exit path
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use mathq_protocol::{Command, Response};

use crate::event_log::{EventKind, EventLog, UNKNOWN_CLIENT};
use crate::queue::{CalcRequest, QueueError, RequestQueue};
use crate::registry::{RegistryError, RegistryHandle, SessionHandle, SessionId};
use crate::writer::{SessionWriter, WriteError};

/// Shared services injected into every session.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: RegistryHandle,
    pub queue: RequestQueue,
    pub event_log: EventLog,
    /// Idle sessions are closed after this long without a line
    pub read_timeout: Duration,
    /// Longest accepted line, excluding the line terminator
    pub max_line_length: usize,
    pub cancel: CancellationToken,
}

/// Protocol state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    AwaitingJoin,
    Joined {
        name: String,
        joined_at: DateTime<Utc>,
    },
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// Client sent `LEAVE`
    Left,
    /// End of stream without `LEAVE`
    PeerClosed,
    /// Server shutdown
    Shutdown,
    /// Connection error
    Failed(SessionError),
}

/// Connection-level failures. Each one terminates the session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Read timed out after {0:?}")]
    Timeout(Duration),

    #[error("Line too long (max: {max} bytes)")]
    LineTooLong { max: usize },

    #[error("Write failed: {0}")]
    Write(#[from] WriteError),

    #[error("Client registry unavailable")]
    RegistryClosed,

    #[error("Request queue unavailable")]
    QueueClosed,
}

/// Protocol state machine for one connection.
pub struct SessionHandler<R> {
    reader: BufReader<R>,
    writer: SessionWriter,
    ctx: SessionContext,
    session_id: SessionId,
    peer: String,
    state: SessionState,
}

impl<R> SessionHandler<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Creates a handler for a connection from `peer`.
    pub fn new(
        reader: R,
        writer: SessionWriter,
        ctx: SessionContext,
        session_id: SessionId,
        peer: impl Into<String>,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            ctx,
            session_id,
            peer: peer.into(),
            state: SessionState::AwaitingJoin,
        }
    }

    /// Runs the session to completion, including cleanup.
    pub async fn run(mut self) -> SessionEnd {
        debug!(session_id = self.session_id, peer = %self.peer, "Session started");

        let end = self.process_lines().await;
        self.cleanup(&end).await;

        debug!(session_id = self.session_id, end = ?end, "Session finished");
        end
    }

    async fn process_lines(&mut self) -> SessionEnd {
        let cancel = self.ctx.cancel.clone();
        let writer = self.writer.clone();

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionEnd::Shutdown,
                _ = writer.broken() => return SessionEnd::Failed(WriteError::Broken.into()),
                read = self.read_line() => read,
            };

            let line = match read {
                Ok(Some(line)) => line,
                Ok(None) => return SessionEnd::PeerClosed,
                Err(e) => return SessionEnd::Failed(e),
            };

            match self.handle_line(&line).await {
                Ok(Some(end)) => return end,
                Ok(None) => {}
                Err(e) => return SessionEnd::Failed(e),
            }
        }
    }

    /// Reads one line. `Ok(None)` means end of stream.
    async fn read_line(&mut self) -> Result<Option<String>, SessionError> {
        // Room for a `\r\n` terminator.
        let limit = self.ctx.max_line_length.saturating_add(2);
        let mut buf = Vec::new();

        let mut limited = (&mut self.reader).take(limit as u64);
        let read = limited.read_until(b'\n', &mut buf);

        let bytes_read = match timeout(self.ctx.read_timeout, read).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(SessionError::Io(e.to_string())),
            Err(_) => return Err(SessionError::Timeout(self.ctx.read_timeout)),
        };

        if bytes_read == 0 {
            return Ok(None);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }

        if buf.len() > self.ctx.max_line_length {
            return Err(SessionError::LineTooLong {
                max: self.ctx.max_line_length,
            });
        }

        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Handles one line. Returns `Some` when the session should end.
    async fn handle_line(&mut self, line: &str) -> Result<Option<SessionEnd>, SessionError> {
        let command = Command::parse(line);
        trace!(session_id = self.session_id, command = ?command, "Received line");

        match (&self.state, command) {
            (_, Command::Malformed(reason)) => {
                self.protocol_error(reason).await?;
            }

            (SessionState::AwaitingJoin, Command::Join { name }) => {
                self.handle_join(name).await?;
            }

            (SessionState::AwaitingJoin, other) => {
                let keyword = other.keyword().unwrap_or_default();
                self.protocol_error(format!("{keyword} before JOIN")).await?;
            }

            (SessionState::Joined { .. }, Command::Join { .. }) => {
                self.protocol_error("Already joined").await?;
            }

            (SessionState::Joined { name, .. }, Command::Calc { name: claimed, expression }) => {
                let name = name.clone();
                warn_on_mismatch(&name, &claimed);
                self.handle_calc(name, expression).await?;
            }

            (SessionState::Joined { name, .. }, Command::Leave { name: claimed }) => {
                warn_on_mismatch(name, &claimed);
                self.writer.send(&Response::goodbye(name.as_str())).await?;
                return Ok(Some(SessionEnd::Left));
            }
        }

        Ok(None)
    }

    async fn handle_join(&mut self, name: String) -> Result<(), SessionError> {
        let handle = SessionHandle {
            session_id: self.session_id,
            writer: self.writer.clone(),
        };

        match self.ctx.registry.register(name.as_str(), handle).await {
            Ok(joined_at) => {
                self.ctx.event_log.record(
                    EventKind::Connect,
                    &name,
                    format_args!("Connected from {}", self.peer),
                );
                self.state = SessionState::Joined {
                    name: name.clone(),
                    joined_at,
                };
                self.writer.send(&Response::welcome(name)).await?;
                Ok(())
            }
            Err(RegistryError::NameTaken(name)) => {
                self.ctx.event_log.record(
                    EventKind::Err,
                    UNKNOWN_CLIENT,
                    format_args!("Client name already in use: {name}"),
                );
                self.writer.send(&Response::name_taken()).await?;
                Ok(())
            }
            Err(RegistryError::ChannelClosed) => Err(SessionError::RegistryClosed),
        }
    }

    async fn handle_calc(&mut self, name: String, expression: String) -> Result<(), SessionError> {
        let request = CalcRequest::new(name.as_str(), expression, self.writer.clone());

        match self.ctx.queue.submit(request) {
            Ok(()) => Ok(()),
            Err(e @ QueueError::Full { .. }) => {
                self.ctx.event_log.record(EventKind::Err, &name, &e);
                self.writer.send(&Response::busy()).await?;
                Ok(())
            }
            Err(QueueError::Closed) => Err(SessionError::QueueClosed),
        }
    }

    /// Logs a protocol error and answers `ERR:Invalid Expression Format`.
    /// The session state is unchanged.
    async fn protocol_error(&mut self, detail: impl std::fmt::Display) -> Result<(), SessionError> {
        let client = self.client_label().to_string();
        self.ctx.event_log.record(EventKind::Err, &client, detail);
        self.writer.send(&Response::invalid_format()).await?;
        Ok(())
    }

    fn client_label(&self) -> &str {
        match &self.state {
            SessionState::Joined { name, .. } => name,
            _ => UNKNOWN_CLIENT,
        }
    }

    /// Deregisters the client (if joined), logs the disconnect and closes
    /// the output channel. Runs exactly once per session.
    async fn cleanup(&mut self, end: &SessionEnd) {
        if let SessionEnd::Failed(e) = end {
            let client = self.client_label().to_string();
            self.ctx.event_log.record(EventKind::Err, &client, e);
        }

        match &self.state {
            SessionState::Joined { name, joined_at } => {
                let connected_for = match self
                    .ctx
                    .registry
                    .deregister(name.as_str(), self.session_id)
                    .await
                {
                    Some(elapsed) => elapsed,
                    None => Utc::now()
                        .signed_duration_since(*joined_at)
                        .to_std()
                        .unwrap_or_default(),
                };

                self.ctx.event_log.record(
                    EventKind::Disconnect,
                    name,
                    format_args!(
                        "Client disconnected after {} seconds",
                        connected_for.as_secs()
                    ),
                );
            }
            SessionState::AwaitingJoin => {
                debug!(
                    session_id = self.session_id,
                    peer = %self.peer,
                    "Session closed before JOIN"
                );
            }
        }

        self.writer.shutdown().await;
    }
}

fn warn_on_mismatch(registered: &str, claimed: &str) {
    if registered != claimed {
        warn!(
            registered = %registered,
            claimed = %claimed,
            "Command names a different client, using the registered name"
        );
    }
}
