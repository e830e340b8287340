//! TCP server for the mathq daemon.
//!
//! The server:
//! - Binds one listening socket before anything else is started
//! - Owns the client registry, the request queue and its single worker
//! - Spawns a `SessionHandler` per connection, bounded by `max_sessions`
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   MathServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ SessionHandler  │────▶│  RegistryHandle │
//! │  (per client)   │     └─────────────────┘
//! └───────┬─────────┘
//!         │ submit
//!         ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  RequestQueue   │────▶│ EvaluationWorker │──▶ RES / ERR
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Accept errors are logged and allow continued operation

mod session;

pub use session::{SessionContext, SessionEnd, SessionError, SessionHandler, SessionState};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use mathq_protocol::Response;

use crate::config::{ConfigError, ServerConfig};
use crate::event_log::{EventKind, EventLog, SERVER_CLIENT, UNKNOWN_CLIENT};
use crate::queue::{spawn_evaluator, Completion, RequestQueue};
use crate::registry::{spawn_registry, RegistryHandle, SessionId};
use crate::writer::SessionWriter;

/// The math server: listener, registry, queue and worker.
pub struct MathServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    registry: RegistryHandle,
    queue: RequestQueue,
    worker: JoinHandle<u64>,
    event_log: EventLog,
    cancel_token: CancellationToken,
    sessions: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl MathServer {
    /// Binds the listening socket, then starts the registry and the
    /// evaluation worker.
    ///
    /// Nothing is started if the configuration is invalid or the port
    /// cannot be bound.
    pub async fn bind(
        config: ServerConfig,
        event_log: EventLog,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let addr = config.socket_addr()?;

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                event_log.record(
                    EventKind::Err,
                    SERVER_CLIENT,
                    format_args!("Failed to bind {addr}: {e}"),
                );
                return Err(ServerError::Bind {
                    addr,
                    error: e.to_string(),
                });
            }
        };

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::LocalAddr(e.to_string()))?;

        let registry = spawn_registry();
        let (queue, worker) = spawn_evaluator(config.queue_capacity, event_log.clone());

        event_log.record(
            EventKind::Connect,
            SERVER_CLIENT,
            format_args!("Server started on port {}", local_addr.port()),
        );
        info!(
            addr = %local_addr,
            max_sessions = config.max_sessions,
            queue_capacity = config.queue_capacity,
            "Math server listening"
        );

        Ok(Self {
            listener,
            local_addr,
            sessions: Arc::new(Semaphore::new(config.max_sessions)),
            config,
            registry,
            queue,
            worker,
            event_log,
            cancel_token,
            tracker: TaskTracker::new(),
        })
    }

    /// Returns the bound address (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns a handle to the client registry.
    pub fn registry(&self) -> RegistryHandle {
        self.registry.clone()
    }

    /// Subscribe to request completions, in evaluation order.
    pub fn subscribe_completions(&self) -> broadcast::Receiver<Completion> {
        self.queue.subscribe()
    }

    /// Runs the accept loop until the cancellation token fires, then shuts
    /// down. Returns the number of requests the worker processed.
    pub async fn run(self) -> Result<u64, ServerError> {
        let mut next_session_id: SessionId = 0;

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            next_session_id += 1;
                            self.handle_connection(stream, peer, next_session_id);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.shutdown().await
    }

    /// Spawns a session, or rejects the connection when the pool is full.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, session_id: SessionId) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let writer = SessionWriter::new(writer, self.config.write_timeout());

        let Ok(permit) = Arc::clone(&self.sessions).try_acquire_owned() else {
            self.event_log.record(
                EventKind::Err,
                UNKNOWN_CLIENT,
                format_args!(
                    "Server busy, rejected connection from {peer} (max sessions: {})",
                    self.config.max_sessions
                ),
            );
            self.tracker.spawn(async move {
                let _ = writer.send(&Response::busy()).await;
                writer.shutdown().await;
            });
            return;
        };

        let ctx = SessionContext {
            registry: self.registry.clone(),
            queue: self.queue.clone(),
            event_log: self.event_log.clone(),
            read_timeout: self.config.read_timeout(),
            max_line_length: self.config.max_line_length,
            cancel: self.cancel_token.clone(),
        };

        self.tracker.spawn(async move {
            let handler = SessionHandler::new(reader, writer, ctx, session_id, peer.to_string());
            handler.run().await;
            drop(permit);
        });
    }

    /// Waits for sessions to clean up, then lets the worker drain the queue.
    async fn shutdown(self) -> Result<u64, ServerError> {
        let Self {
            listener,
            registry,
            queue,
            worker,
            event_log,
            tracker,
            ..
        } = self;

        drop(listener);
        event_log.record(EventKind::Connect, SERVER_CLIENT, "Server shutting down...");

        tracker.close();
        tracker.wait().await;
        debug!("All sessions finished");

        drop(queue);
        drop(registry);

        let processed = worker
            .await
            .map_err(|e| ServerError::Worker(e.to_string()))?;

        info!(processed, "Server stopped");
        Ok(processed)
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("Failed to read local address: {0}")]
    LocalAddr(String),

    #[error("Evaluation worker failed: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:12345".parse().unwrap(),
            error: "address in use".to_string(),
        };
        assert!(err.to_string().contains("127.0.0.1:12345"));
        assert!(err.to_string().contains("address in use"));
    }

    #[tokio::test]
    async fn test_bind_port_zero_reports_real_port() {
        let server = MathServer::bind(test_config(), EventLog::console_only(), CancellationToken::new())
            .await
            .unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = ServerConfig {
            max_sessions: 0,
            ..test_config()
        };
        let result = MathServer::bind(config, EventLog::console_only(), CancellationToken::new()).await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_bind_fails_when_port_taken() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig {
            port: taken.local_addr().unwrap().port(),
            ..test_config()
        };
        let result = MathServer::bind(config, EventLog::console_only(), CancellationToken::new()).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_run_returns_after_cancel() {
        let cancel = CancellationToken::new();
        let server = MathServer::bind(test_config(), EventLog::console_only(), cancel.clone())
            .await
            .unwrap();

        let task = tokio::spawn(server.run());
        cancel.cancel();
        assert_eq!(task.await.unwrap().unwrap(), 0);
    }
}
