//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to client events.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed` or an empty answer

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{ClientEvent, RegistryCommand, RegistryError, SessionHandle, SessionId};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle injected into every session.
/// All methods are async and communicate with the actor via channels.
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<ClientEvent>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Register `name` for the given session and return the join instant.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NameTaken` if another session holds the name
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn register(
        &self,
        name: impl Into<String>,
        handle: SessionHandle,
    ) -> Result<DateTime<Utc>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Register {
                name: name.into(),
                handle,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Remove `name` if it belongs to `session_id`.
    ///
    /// Returns how long the client was registered, or `None` if the name
    /// was not registered to that session or the actor is gone.
    pub async fn deregister(&self, name: impl Into<String>, session_id: SessionId) -> Option<Duration> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Deregister {
                name: name.into(),
                session_id,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Get the session that owns `name`.
    pub async fn lookup(&self, name: impl Into<String>) -> Option<SessionHandle> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Lookup {
                name: name.into(),
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Returns `true` if `name` is currently registered.
    pub async fn contains(&self, name: impl Into<String>) -> bool {
        self.lookup(name).await.is_some()
    }

    /// Get all registered names, sorted.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn client_names(&self) -> Vec<String> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::ListClients { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Number of registered clients.
    pub async fn count(&self) -> usize {
        self.client_names().await.len()
    }

    /// Subscribe to join/leave events.
    ///
    /// This is a synchronous operation - it doesn't communicate with the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_sender.subscribe()
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
