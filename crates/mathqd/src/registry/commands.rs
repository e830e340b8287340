//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `ClientEvent`: Events published by the registry for subscribers

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::writer::SessionWriter;

/// Identifies one accepted connection for the lifetime of the server.
pub type SessionId = u64;

/// What the registry keeps for a joined session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Connection that owns the name
    pub session_id: SessionId,
    /// Output channel of that connection
    pub writer: SessionWriter,
}

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command that needs an answer carries a oneshot channel for it.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Register a client name for a session.
    ///
    /// # Errors
    /// - `RegistryError::NameTaken` if another session holds the name
    Register {
        /// Client name from `JOIN:<name>`
        name: String,
        /// Session that will own the name
        handle: SessionHandle,
        /// Receives the join instant
        respond_to: oneshot::Sender<Result<DateTime<Utc>, RegistryError>>,
    },

    /// Remove a client name, if it is still owned by `session_id`.
    ///
    /// Answers with how long the client was connected, or `None` if the
    /// name was not registered to that session.
    Deregister {
        /// Client name to remove
        name: String,
        /// Session asking for the removal
        session_id: SessionId,
        /// Receives the connected duration
        respond_to: oneshot::Sender<Option<Duration>>,
    },

    /// Look up the session that owns a name.
    Lookup {
        /// Client name to look up
        name: String,
        /// Receives the session handle, if any
        respond_to: oneshot::Sender<Option<SessionHandle>>,
    },

    /// List all registered names, sorted.
    ListClients {
        /// Receives the names
        respond_to: oneshot::Sender<Vec<String>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Another live session already joined with this name.
    #[error("client name already in use: {0}")]
    NameTaken(String),

    /// The actor is gone (server shutting down).
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Client Events
// ============================================================================

/// Events published by the registry to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A client joined.
    Joined {
        /// Client name
        name: String,
        /// When the registration happened
        joined_at: DateTime<Utc>,
    },

    /// A client was deregistered.
    Left {
        /// Client name
        name: String,
        /// How long the client was registered
        connected_for: Duration,
    },
}
