//! Registry actor - owns the client table and processes commands.
//!
//! The RegistryActor is the single owner of the name → session mapping.
//! It receives commands via an mpsc channel and publishes events via broadcast.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel send failures are ignored or logged, never panic

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use super::commands::{ClientEvent, RegistryCommand, RegistryError, SessionHandle, SessionId};

/// One registered client.
#[derive(Debug, Clone)]
struct RegistryEntry {
    handle: SessionHandle,
    joined_at: DateTime<Utc>,
}

/// The registry actor - owns all client registrations.
///
/// Commands are processed one at a time inside a single task, so a
/// register and a deregister can never interleave.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Registered clients keyed by name
    clients: HashMap<String, RegistryEntry>,

    /// Event publisher for subscribers
    event_publisher: broadcast::Sender<ClientEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            receiver,
            clients: HashMap::new(),
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all handles dropped).
    pub async fn run(mut self) {
        debug!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        debug!(clients = self.clients.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                name,
                handle,
                respond_to,
            } => {
                let result = self.handle_register(name, handle);
                // Ignore send error - the session may have gone away
                let _ = respond_to.send(result);
            }
            RegistryCommand::Deregister {
                name,
                session_id,
                respond_to,
            } => {
                let result = self.handle_deregister(&name, session_id);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Lookup { name, respond_to } => {
                let result = self.clients.get(&name).map(|entry| entry.handle.clone());
                let _ = respond_to.send(result);
            }
            RegistryCommand::ListClients { respond_to } => {
                let mut names: Vec<String> = self.clients.keys().cloned().collect();
                names.sort();
                let _ = respond_to.send(names);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Handles registration. A name held by another session is rejected.
    fn handle_register(
        &mut self,
        name: String,
        handle: SessionHandle,
    ) -> Result<DateTime<Utc>, RegistryError> {
        if let Some(existing) = self.clients.get(&name) {
            debug!(
                name = %name,
                owner = existing.handle.session_id,
                requested_by = handle.session_id,
                "Client name already registered, rejecting"
            );
            return Err(RegistryError::NameTaken(name));
        }

        let joined_at = Utc::now();
        let session_id = handle.session_id;
        self.clients
            .insert(name.clone(), RegistryEntry { handle, joined_at });

        info!(
            name = %name,
            session_id,
            total_clients = self.clients.len(),
            "Client registered"
        );

        let _ = self
            .event_publisher
            .send(ClientEvent::Joined { name, joined_at });

        Ok(joined_at)
    }

    /// Handles deregistration. Only the owning session may remove a name.
    fn handle_deregister(&mut self, name: &str, session_id: SessionId) -> Option<Duration> {
        match self.clients.get(name) {
            Some(entry) if entry.handle.session_id == session_id => {}
            Some(entry) => {
                debug!(
                    name = %name,
                    owner = entry.handle.session_id,
                    requested_by = session_id,
                    "Ignoring deregister from non-owning session"
                );
                return None;
            }
            None => return None,
        }

        let entry = self.clients.remove(name)?;
        let connected_for = Utc::now()
            .signed_duration_since(entry.joined_at)
            .to_std()
            .unwrap_or_default();

        info!(
            name = %name,
            session_id,
            connected_secs = connected_for.as_secs(),
            remaining_clients = self.clients.len(),
            "Client deregistered"
        );

        let _ = self.event_publisher.send(ClientEvent::Left {
            name: name.to_string(),
            connected_for,
        });

        Some(connected_for)
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    /// Returns the number of registered clients.
    #[cfg(test)]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::SessionWriter;
    use tokio::sync::oneshot;

    fn create_handle(session_id: SessionId) -> SessionHandle {
        let (_client, server) = tokio::io::duplex(64);
        SessionHandle {
            session_id,
            writer: SessionWriter::new(server, Duration::from_secs(1)),
        }
    }

    fn create_actor() -> (RegistryActor, broadcast::Receiver<ClientEvent>) {
        let (_cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = broadcast::channel(16);
        (RegistryActor::new(cmd_rx, event_tx), event_rx)
    }

    fn register(actor: &mut RegistryActor, name: &str, session_id: SessionId) -> oneshot::Receiver<Result<DateTime<Utc>, RegistryError>> {
        let (tx, rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::Register {
            name: name.to_string(),
            handle: create_handle(session_id),
            respond_to: tx,
        });
        rx
    }

    fn deregister(actor: &mut RegistryActor, name: &str, session_id: SessionId) -> oneshot::Receiver<Option<Duration>> {
        let (tx, rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::Deregister {
            name: name.to_string(),
            session_id,
            respond_to: tx,
        });
        rx
    }

    #[tokio::test]
    async fn test_register_client() {
        let (mut actor, mut event_rx) = create_actor();

        let joined_at = register(&mut actor, "alice", 1).await.unwrap().unwrap();
        assert_eq!(actor.client_count(), 1);

        let event = event_rx.try_recv().unwrap();
        assert_eq!(
            event,
            ClientEvent::Joined {
                name: "alice".to_string(),
                joined_at
            }
        );
    }

    #[tokio::test]
    async fn test_register_duplicate_name_rejected() {
        let (mut actor, _) = create_actor();

        register(&mut actor, "alice", 1).await.unwrap().unwrap();
        let result = register(&mut actor, "alice", 2).await.unwrap();

        assert_eq!(result, Err(RegistryError::NameTaken("alice".to_string())));
        assert_eq!(actor.client_count(), 1);
    }

    #[tokio::test]
    async fn test_deregister_returns_duration() {
        let (mut actor, mut event_rx) = create_actor();

        register(&mut actor, "alice", 1).await.unwrap().unwrap();
        let _ = event_rx.try_recv();

        let elapsed = deregister(&mut actor, "alice", 1).await.unwrap();
        assert!(elapsed.is_some());
        assert_eq!(actor.client_count(), 0);
        assert!(matches!(event_rx.try_recv(), Ok(ClientEvent::Left { .. })));
    }

    #[tokio::test]
    async fn test_deregister_twice_is_noop() {
        let (mut actor, _) = create_actor();

        register(&mut actor, "alice", 1).await.unwrap().unwrap();
        assert!(deregister(&mut actor, "alice", 1).await.unwrap().is_some());
        assert!(deregister(&mut actor, "alice", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deregister_by_other_session_ignored() {
        let (mut actor, _) = create_actor();

        register(&mut actor, "alice", 1).await.unwrap().unwrap();
        assert!(deregister(&mut actor, "alice", 2).await.unwrap().is_none());
        assert_eq!(actor.client_count(), 1);
    }

    #[tokio::test]
    async fn test_name_reusable_after_deregister() {
        let (mut actor, _) = create_actor();

        register(&mut actor, "alice", 1).await.unwrap().unwrap();
        deregister(&mut actor, "alice", 1).await.unwrap();

        let result = register(&mut actor, "alice", 2).await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_lookup_and_list() {
        let (mut actor, _) = create_actor();

        register(&mut actor, "bob", 7).await.unwrap().unwrap();
        register(&mut actor, "alice", 8).await.unwrap().unwrap();

        let (tx, rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::Lookup {
            name: "bob".to_string(),
            respond_to: tx,
        });
        let handle = rx.await.unwrap().unwrap();
        assert_eq!(handle.session_id, 7);

        let (tx, rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::ListClients { respond_to: tx });
        assert_eq!(rx.await.unwrap(), vec!["alice".to_string(), "bob".to_string()]);
    }
}
