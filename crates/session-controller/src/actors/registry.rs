//! `RoomRegistryActor` - singleton supervisor for room actors.
//!
//! The registry is the top-level actor:
//!
//! - Singleton per controller instance
//! - Supervises N `RoomActor` instances
//! - Allocates a routing context before spawning each room
//! - Owns the root `CancellationToken` for graceful shutdown
//!
//! # Graceful Shutdown
//!
//! On SIGTERM, the registry:
//! 1. Sets `accepting_new = false`
//! 2. Cancels the root `CancellationToken` (propagates to all rooms)
//! 3. Rooms tear down their peers and release routing contexts

use crate::errors::ScError;
use crate::media::MediaEngine;
use crate::observability::RegistryMetrics;
use crate::storage::SessionStore;

use super::messages::{RegistryMessage, RegistryStatus};
use super::room::{RoomActor, RoomActorHandle};

use access_control::RateLimitConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the registry mailbox.
const REGISTRY_CHANNEL_BUFFER: usize = 1000;

/// Handle to the `RoomRegistryActor`.
///
/// This is the public interface for interacting with the registry.
/// All methods are async and return results via oneshot channels.
#[derive(Debug, Clone)]
pub struct RoomRegistryActorHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
}

impl RoomRegistryActorHandle {
    /// Create a new `RoomRegistryActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sc_id: String,
        media: Arc<dyn MediaEngine>,
        store: Arc<dyn SessionStore>,
        rate_config: RateLimitConfig,
        audit_capacity: usize,
        max_rooms: usize,
        max_peers_per_room: usize,
        metrics: Arc<RegistryMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = RoomRegistryActor {
            sc_id,
            receiver,
            self_sender: sender.clone(),
            cancel_token: cancel_token.clone(),
            media,
            store,
            rate_config,
            audit_capacity,
            max_rooms,
            max_peers_per_room,
            rooms: HashMap::new(),
            accepting_new: true,
            metrics,
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Look up a room, creating it if absent.
    pub async fn get_or_create_room(&self, room_id: String) -> Result<RoomActorHandle, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RegistryMessage::GetOrCreateRoom {
                room_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get the current registry status.
    pub async fn get_status(&self) -> Result<RegistryStatus, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RegistryMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self) -> Result<(), ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RegistryMessage::Shutdown { respond_to: tx })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token tied to the registry's lifetime.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// Internal state for a managed room.
struct ManagedRoom {
    /// Handle to the room actor.
    handle: RoomActorHandle,
    /// Join handle for monitoring the actor task.
    task_handle: JoinHandle<()>,
}

/// The `RoomRegistryActor` implementation.
///
/// This struct owns the actor state and runs the message loop.
pub struct RoomRegistryActor {
    /// Controller instance ID.
    sc_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<RegistryMessage>,
    /// Own sender, handed to room actors for empty-room notifications.
    self_sender: mpsc::Sender<RegistryMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    /// Media engine collaborator.
    media: Arc<dyn MediaEngine>,
    /// Persistence collaborator.
    store: Arc<dyn SessionStore>,
    /// Rate limit configuration handed to each room.
    rate_config: RateLimitConfig,
    /// Audit log capacity handed to each room.
    audit_capacity: usize,
    /// Maximum concurrent rooms.
    max_rooms: usize,
    /// Maximum live peers per room, handed to each room.
    max_peers_per_room: usize,
    /// Managed rooms by ID.
    rooms: HashMap<String, ManagedRoom>,
    /// Whether the registry is accepting new rooms.
    accepting_new: bool,
    /// Shared metrics.
    metrics: Arc<RegistryMetrics>,
}

impl RoomRegistryActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "sc.actor.registry", fields(sc_id = %self.sc_id))]
    async fn run(mut self) {
        info!(
            target: "sc.actor.registry",
            sc_id = %self.sc_id,
            "RoomRegistryActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "sc.actor.registry",
                        sc_id = %self.sc_id,
                        "RoomRegistryActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            info!(
                                target: "sc.actor.registry",
                                sc_id = %self.sc_id,
                                "RoomRegistryActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "sc.actor.registry",
            sc_id = %self.sc_id,
            rooms = self.rooms.len(),
            "RoomRegistryActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::GetOrCreateRoom {
                room_id,
                respond_to,
            } => {
                let result = self.handle_get_or_create(room_id).await;
                let _ = respond_to.send(result);
            }

            RegistryMessage::RoomEmpty { room_id } => {
                self.handle_room_empty(&room_id).await;
            }

            RegistryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(RegistryStatus {
                    sc_id: self.sc_id.clone(),
                    room_count: self.rooms.len(),
                    accepting_new: self.accepting_new,
                });
            }

            RegistryMessage::Shutdown { respond_to } => {
                info!(
                    target: "sc.actor.registry",
                    sc_id = %self.sc_id,
                    rooms = self.rooms.len(),
                    "Graceful shutdown initiated"
                );
                self.accepting_new = false;
                self.cancel_token.cancel();
                let _ = respond_to.send(Ok(()));
            }
        }
    }

    async fn handle_get_or_create(&mut self, room_id: String) -> Result<RoomActorHandle, ScError> {
        if !self.accepting_new {
            return Err(ScError::Draining);
        }

        // Drop any entry whose actor already terminated (e.g. a room
        // that emptied moments ago); a fresh routing context is needed.
        if let Some(managed) = self.rooms.get(&room_id) {
            if managed.task_handle.is_finished() {
                debug!(
                    target: "sc.actor.registry",
                    room_id = %room_id,
                    "Replacing terminated room actor"
                );
                self.remove_room(&room_id);
            }
        }

        if let Some(managed) = self.rooms.get(&room_id) {
            return Ok(managed.handle.clone());
        }

        if self.rooms.len() >= self.max_rooms {
            warn!(
                target: "sc.actor.registry",
                sc_id = %self.sc_id,
                max_rooms = self.max_rooms,
                "Room limit reached"
            );
            return Err(ScError::Conflict("Room limit reached".to_string()));
        }

        // Routing-context creation failures propagate: the room cannot
        // be used without one.
        let router_id = self
            .media
            .create_router(&room_id)
            .await
            .map_err(|e| {
                error!(
                    target: "sc.actor.registry",
                    room_id = %room_id,
                    error = %e,
                    "Routing context allocation failed"
                );
                ScError::Media(e.to_string())
            })?;

        let (handle, task_handle) = RoomActor::spawn(
            room_id.clone(),
            router_id,
            self.cancel_token.child_token(),
            self.self_sender.clone(),
            Arc::clone(&self.media),
            Arc::clone(&self.store),
            self.rate_config,
            self.audit_capacity,
            self.max_peers_per_room,
            Arc::clone(&self.metrics),
        );

        info!(
            target: "sc.actor.registry",
            sc_id = %self.sc_id,
            room_id = %room_id,
            "Room created"
        );
        self.metrics.room_created();
        self.rooms.insert(
            room_id,
            ManagedRoom {
                handle: handle.clone(),
                task_handle,
            },
        );

        Ok(handle)
    }

    async fn handle_room_empty(&mut self, room_id: &str) {
        if self.rooms.contains_key(room_id) {
            info!(
                target: "sc.actor.registry",
                sc_id = %self.sc_id,
                room_id = %room_id,
                "Room removed (empty)"
            );
            self.remove_room(room_id);
        }
    }

    fn remove_room(&mut self, room_id: &str) {
        if let Some(managed) = self.rooms.remove(room_id) {
            managed.handle.cancel();
            managed.task_handle.abort();
            self.metrics.room_removed();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::connection::ConnectionActor;
    use crate::media::LocalMediaEngine;
    use crate::storage::MemoryStore;

    fn spawn_registry(max_rooms: usize) -> RoomRegistryActorHandle {
        RoomRegistryActorHandle::new(
            "sc-test".to_string(),
            Arc::new(LocalMediaEngine::new()),
            Arc::new(MemoryStore::new()),
            RateLimitConfig::default(),
            100,
            max_rooms,
            100,
            RegistryMetrics::new(),
        )
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let registry = spawn_registry(10);

        let first = registry.get_or_create_room("room-1".to_string()).await.unwrap();
        let second = registry.get_or_create_room("room-1".to_string()).await.unwrap();
        assert_eq!(first.room_id(), second.room_id());

        let status = registry.get_status().await.unwrap();
        assert_eq!(status.room_count, 1);
        assert!(status.accepting_new);
    }

    #[tokio::test]
    async fn test_room_limit_enforced() {
        let registry = spawn_registry(1);

        registry.get_or_create_room("room-1".to_string()).await.unwrap();
        let result = registry.get_or_create_room("room-2".to_string()).await;
        assert!(matches!(result, Err(ScError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_empty_room_is_removed_from_registry() {
        let registry = spawn_registry(10);
        let room = registry.get_or_create_room("room-1".to_string()).await.unwrap();

        let (outbound_tx, _outbound_rx) = tokio::sync::mpsc::channel(10);
        let (events, _task) =
            ConnectionActor::spawn("conn-1".to_string(), room.child_token(), outbound_tx);
        room.join(
            "conn-1".to_string(),
            "alice".to_string(),
            "Alice".to_string(),
            None,
            events,
        )
        .await
        .unwrap();

        room.disconnect("conn-1".to_string()).await;

        // The removal message is processed asynchronously.
        let mut removed = false;
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            let status = registry.get_status().await.unwrap();
            if status.room_count == 0 {
                removed = true;
                break;
            }
        }
        assert!(removed, "empty room should leave the registry");
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_rooms() {
        let registry = spawn_registry(10);
        registry.shutdown().await.unwrap();
        assert!(registry.is_cancelled());
    }
}
