//! `RoomActor` - per-room actor that owns all room state.
//!
//! Each `RoomActor`:
//! - Owns the peer map and every peer's transport/producer/consumer maps
//! - Owns the room's routing context (router) at the media engine
//! - Runs the privileged-action pipeline: rate limit, permission check,
//!   persisted-state update, targeted notification, roster broadcast,
//!   audit write
//! - Tears itself down when its last peer leaves
//!
//! All mutation goes through the mailbox, so there is no shared-state
//! locking: concurrent connections interleave at message granularity.

use crate::errors::ScError;
use crate::media::{MediaEngine, TransportParams};
use crate::observability::RegistryMetrics;
use crate::protocol::{
    MediaKind, ParticipantInfo, RemoteProducer, ServerMessage, TransportDirection,
};
use crate::storage::{ParticipantRecord, ParticipantUpdate, SessionStore};

use super::connection::ConnectionActorHandle;
use super::messages::{
    ConsumeOutcome, JoinOutcome, RegistryMessage, RoomMessage, RoomState,
};

use access_control::{
    AuditLog, AuditLogEntry, ControlAction, DenyReason, PermissionEngine, PermissionRequest,
    RateLimitConfig, RateLimiter, Role, TargetContext,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 500;

/// Handle to a `RoomActor`.
#[derive(Debug, Clone)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: String,
}

impl RoomActorHandle {
    /// Get the room ID.
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// A connection joins (or re-joins) this room.
    pub async fn join(
        &self,
        connection_id: String,
        user_id: String,
        name: String,
        image_url: Option<String>,
        events: ConnectionActorHandle,
    ) -> Result<JoinOutcome, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::Join {
                connection_id,
                user_id,
                name,
                image_url,
                events,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Router RTP capabilities.
    pub async fn get_capabilities(
        &self,
        connection_id: String,
    ) -> Result<serde_json::Value, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::GetCapabilities {
                connection_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Create a transport for the requesting peer.
    pub async fn create_transport(
        &self,
        connection_id: String,
        direction: TransportDirection,
    ) -> Result<TransportParams, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::CreateTransport {
                connection_id,
                direction,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Complete the DTLS handshake for a transport.
    pub async fn connect_transport(
        &self,
        connection_id: String,
        transport_id: String,
        dtls_parameters: serde_json::Value,
    ) -> Result<(), ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::ConnectTransport {
                connection_id,
                transport_id,
                dtls_parameters,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Create a producer, subject to lock and policy checks.
    pub async fn produce(
        &self,
        connection_id: String,
        transport_id: String,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
        screen_share: bool,
    ) -> Result<String, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::Produce {
                connection_id,
                transport_id,
                kind,
                rtp_parameters,
                screen_share,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Create a consumer bound to a remote producer.
    pub async fn consume(
        &self,
        connection_id: String,
        transport_id: String,
        producer_id: String,
        rtp_capabilities: serde_json::Value,
    ) -> Result<ConsumeOutcome, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::Consume {
                connection_id,
                transport_id,
                producer_id,
                rtp_capabilities,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Unpause a consumer.
    pub async fn resume_consumer(
        &self,
        connection_id: String,
        consumer_id: String,
    ) -> Result<(), ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::ResumeConsumer {
                connection_id,
                consumer_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Close a producer (owner only).
    pub async fn close_producer(
        &self,
        connection_id: String,
        producer_id: String,
    ) -> Result<(), ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::CloseProducer {
                connection_id,
                producer_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Execute a privileged control action.
    pub async fn control(
        &self,
        connection_id: String,
        action: ControlAction,
        target_id: Option<String>,
    ) -> Result<(), ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::Control {
                connection_id,
                action,
                target_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Tear down a connection's peer (leave or socket close).
    pub async fn disconnect(&self, connection_id: String) {
        let _ = self
            .sender
            .send(RoomMessage::Disconnect { connection_id })
            .await;
    }

    /// Room state snapshot.
    pub async fn get_state(&self) -> Result<RoomState, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::GetState { respond_to: tx })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    /// Audit entries recorded for this room.
    pub async fn get_audit(&self) -> Result<Vec<AuditLogEntry>, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::GetAudit { respond_to: tx })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the room actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Get a child token for connection actors.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// Producer bookkeeping under a peer.
#[derive(Debug, Clone, Copy)]
struct ProducerEntry {
    kind: MediaKind,
    screen_share: bool,
}

/// Consumer bookkeeping under a peer.
#[derive(Debug, Clone)]
struct ConsumerEntry {
    producer_id: String,
}

/// Live peer state within a room.
struct Peer {
    connection_id: String,
    user_id: String,
    /// Cached role flags for fast checks. Privileged decisions re-read
    /// persisted state; these only guard join-preservation and notices.
    is_host: bool,
    is_co_host: bool,
    transports: HashMap<String, TransportDirection>,
    producers: HashMap<String, ProducerEntry>,
    consumers: HashMap<String, ConsumerEntry>,
    events: ConnectionActorHandle,
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    /// Room ID.
    room_id: String,
    /// Routing context at the media engine.
    router_id: String,
    /// Set once the routing context has been closed.
    router_released: bool,
    /// Message receiver.
    receiver: mpsc::Receiver<RoomMessage>,
    /// Cancellation token (child of the registry's token).
    cancel_token: CancellationToken,
    /// Channel back to the registry for empty-room removal.
    registry: mpsc::Sender<RegistryMessage>,
    /// Media engine collaborator.
    media: Arc<dyn MediaEngine>,
    /// Persistence collaborator.
    store: Arc<dyn SessionStore>,
    /// Live peers by connection ID.
    peers: HashMap<String, Peer>,
    /// Maximum live peers admitted to this room.
    max_peers: usize,
    /// Room-wide screen share policy flag.
    screen_share_enabled: bool,
    /// Whether a room-wide audio lock is currently active. Consulted on
    /// promote/demote to re-evaluate exemptions.
    audio_lock_active: bool,
    /// Whether a room-wide camera lock is currently active.
    video_lock_active: bool,
    /// Room creator's user id, fixed at room record creation.
    creator_id: Option<String>,
    engine: PermissionEngine,
    rate_limiter: RateLimiter,
    audit: AuditLog,
    metrics: Arc<RegistryMetrics>,
}

impl RoomActor {
    /// Spawn a new room actor. The caller has already allocated the
    /// routing context; the actor owns it from here on.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        room_id: String,
        router_id: String,
        cancel_token: CancellationToken,
        registry: mpsc::Sender<RegistryMessage>,
        media: Arc<dyn MediaEngine>,
        store: Arc<dyn SessionStore>,
        rate_config: RateLimitConfig,
        audit_capacity: usize,
        max_peers: usize,
        metrics: Arc<RegistryMetrics>,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);

        let actor = Self {
            room_id: room_id.clone(),
            router_id,
            router_released: false,
            receiver,
            cancel_token: cancel_token.clone(),
            registry,
            media,
            store,
            peers: HashMap::new(),
            max_peers,
            screen_share_enabled: true,
            audio_lock_active: false,
            video_lock_active: false,
            creator_id: None,
            engine: PermissionEngine,
            rate_limiter: RateLimiter::new(rate_config),
            audit: AuditLog::new(audit_capacity),
            metrics,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "sc.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(
            target: "sc.actor.room",
            room_id = %self.room_id,
            "RoomActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "sc.actor.room",
                        room_id = %self.room_id,
                        "RoomActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.metrics.record_request();
                            self.handle_message(message).await;
                        }
                        None => {
                            info!(
                                target: "sc.actor.room",
                                room_id = %self.room_id,
                                "RoomActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "sc.actor.room",
            room_id = %self.room_id,
            peers = self.peers.len(),
            "RoomActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::Join {
                connection_id,
                user_id,
                name,
                image_url,
                events,
                respond_to,
            } => {
                let result = self
                    .handle_join(connection_id, user_id, name, image_url, events)
                    .await;
                let _ = respond_to.send(result);
            }

            RoomMessage::GetCapabilities {
                connection_id,
                respond_to,
            } => {
                let result = self.handle_get_capabilities(&connection_id).await;
                let _ = respond_to.send(result);
            }

            RoomMessage::CreateTransport {
                connection_id,
                direction,
                respond_to,
            } => {
                let result = self.handle_create_transport(&connection_id, direction).await;
                let _ = respond_to.send(result);
            }

            RoomMessage::ConnectTransport {
                connection_id,
                transport_id,
                dtls_parameters,
                respond_to,
            } => {
                let result = self
                    .handle_connect_transport(&connection_id, &transport_id, dtls_parameters)
                    .await;
                let _ = respond_to.send(result);
            }

            RoomMessage::Produce {
                connection_id,
                transport_id,
                kind,
                rtp_parameters,
                screen_share,
                respond_to,
            } => {
                let result = self
                    .handle_produce(&connection_id, &transport_id, kind, rtp_parameters, screen_share)
                    .await;
                let _ = respond_to.send(result);
            }

            RoomMessage::Consume {
                connection_id,
                transport_id,
                producer_id,
                rtp_capabilities,
                respond_to,
            } => {
                let result = self
                    .handle_consume(&connection_id, &transport_id, &producer_id, rtp_capabilities)
                    .await;
                let _ = respond_to.send(result);
            }

            RoomMessage::ResumeConsumer {
                connection_id,
                consumer_id,
                respond_to,
            } => {
                let result = self.handle_resume_consumer(&connection_id, &consumer_id).await;
                let _ = respond_to.send(result);
            }

            RoomMessage::CloseProducer {
                connection_id,
                producer_id,
                respond_to,
            } => {
                let result = self.handle_close_producer(&connection_id, &producer_id).await;
                let _ = respond_to.send(result);
            }

            RoomMessage::Control {
                connection_id,
                action,
                target_id,
                respond_to,
            } => {
                let result = self
                    .handle_control(&connection_id, action, target_id.as_deref())
                    .await;
                let _ = respond_to.send(result);
            }

            RoomMessage::Disconnect { connection_id } => {
                self.handle_disconnect(&connection_id).await;
            }

            RoomMessage::GetState { respond_to } => {
                let _ = respond_to.send(RoomState {
                    room_id: self.room_id.clone(),
                    peer_count: self.peers.len(),
                    screen_share_enabled: self.screen_share_enabled,
                });
            }

            RoomMessage::GetAudit { respond_to } => {
                let _ = respond_to.send(self.audit.for_room(&self.room_id));
            }
        }
    }

    // ------------------------------------------------------------------
    // Join / roster
    // ------------------------------------------------------------------

    async fn handle_join(
        &mut self,
        connection_id: String,
        user_id: String,
        name: String,
        image_url: Option<String>,
        events: ConnectionActorHandle,
    ) -> Result<JoinOutcome, ScError> {
        // A connection keeps one identity for its lifetime; rejecting
        // here keeps the persisted roster free of orphan records.
        if let Some(peer) = self.peers.get(&connection_id) {
            if peer.user_id != user_id {
                return Err(ScError::Conflict(
                    "Connection already joined as another user".to_string(),
                ));
            }
        }
        if !self.peers.contains_key(&connection_id) && self.peers.len() >= self.max_peers {
            return Err(ScError::Conflict("Room is full".to_string()));
        }

        let room = self
            .store
            .upsert_room(&self.room_id, &user_id)
            .await
            .map_err(|e| ScError::Storage(e.to_string()))?;
        self.creator_id = Some(room.creator_id.clone());

        // First joiner becomes the room's host.
        let derived_role = if room.creator_id == user_id {
            Role::Host
        } else {
            Role::Participant
        };

        let stored = self
            .store
            .upsert_participant(ParticipantRecord::new(
                &self.room_id,
                &user_id,
                &name,
                image_url,
                derived_role,
            ))
            .await
            .map_err(|e| ScError::Storage(e.to_string()))?;

        let rejoin = self.peers.contains_key(&connection_id);
        if let Some(peer) = self.peers.get_mut(&connection_id) {
            // Duplicate join from the same connection: answer with known
            // state. Privileged flags already set on the live peer win
            // over a freshly derived computation, so an in-flight
            // promotion is never downgraded.
            peer.is_host = peer.is_host || stored.role == Role::Host;
            peer.is_co_host = peer.is_co_host || stored.role == Role::CoHost;
            debug!(
                target: "sc.actor.room",
                room_id = %self.room_id,
                connection_id = %connection_id,
                "Duplicate join answered with existing peer state"
            );
        } else {
            self.peers.insert(
                connection_id.clone(),
                Peer {
                    connection_id: connection_id.clone(),
                    user_id: user_id.clone(),
                    is_host: stored.role == Role::Host,
                    is_co_host: stored.role == Role::CoHost,
                    transports: HashMap::new(),
                    producers: HashMap::new(),
                    consumers: HashMap::new(),
                    events,
                },
            );
            self.metrics.peer_joined();
            info!(
                target: "sc.actor.room",
                room_id = %self.room_id,
                connection_id = %connection_id,
                user_id = %user_id,
                role = stored.role.as_str(),
                "Peer joined"
            );
        }

        let participants = self.build_roster().await?;
        let producers = self.remote_producers(&connection_id);

        if !rejoin {
            self.broadcast_except(
                &connection_id,
                ServerMessage::ParticipantList {
                    participants: participants.clone(),
                },
            )
            .await;
        }

        Ok(JoinOutcome {
            peer_id: connection_id,
            role: stored.role,
            rejoin,
            participants,
            producers,
        })
    }

    /// Build the roster from persisted records, annotated with live
    /// connection ids. Persisted entries with no live peer are skipped.
    async fn build_roster(&self) -> Result<Vec<ParticipantInfo>, ScError> {
        let records = self
            .store
            .list_participants(&self.room_id)
            .await
            .map_err(|e| ScError::Storage(e.to_string()))?;

        let mut roster = Vec::new();
        for record in records {
            let Some(peer) = self.peer_by_user(&record.user_id) else {
                continue;
            };
            roster.push(ParticipantInfo {
                peer_id: peer.connection_id.clone(),
                user_id: record.user_id,
                name: record.name,
                image_url: record.image_url,
                role: record.role,
                is_audio_muted: record.is_audio_muted,
                is_video_paused: record.is_video_paused,
                audio_locked: record.audio_locked,
                screen_share_locked: record.screen_share_locked,
            });
        }
        Ok(roster)
    }

    /// Producers owned by everyone except `connection_id`.
    fn remote_producers(&self, connection_id: &str) -> Vec<RemoteProducer> {
        let mut producers = Vec::new();
        for peer in self.peers.values() {
            if peer.connection_id == connection_id {
                continue;
            }
            for (producer_id, entry) in &peer.producers {
                producers.push(RemoteProducer {
                    producer_id: producer_id.clone(),
                    peer_id: peer.connection_id.clone(),
                    user_id: peer.user_id.clone(),
                    kind: entry.kind,
                    screen_share: entry.screen_share,
                });
            }
        }
        producers
    }

    fn peer_by_user(&self, user_id: &str) -> Option<&Peer> {
        self.peers.values().find(|p| p.user_id == user_id)
    }

    async fn broadcast(&self, message: ServerMessage) {
        for peer in self.peers.values() {
            peer.events.deliver(message.clone()).await;
        }
    }

    async fn broadcast_except(&self, connection_id: &str, message: ServerMessage) {
        for peer in self.peers.values() {
            if peer.connection_id != connection_id {
                peer.events.deliver(message.clone()).await;
            }
        }
    }

    /// Re-broadcast the roster after a state change. Storage failures
    /// are logged; clients recover on the next successful broadcast.
    async fn broadcast_roster(&self) {
        match self.build_roster().await {
            Ok(participants) => {
                self.broadcast(ServerMessage::ParticipantList { participants })
                    .await;
            }
            Err(e) => {
                warn!(
                    target: "sc.actor.room",
                    room_id = %self.room_id,
                    error = %e,
                    "Roster broadcast skipped"
                );
            }
        }
    }

    /// Broadcast one participant's updated state. Falls back to a full
    /// roster broadcast if the record or live peer cannot be found.
    async fn broadcast_participant_state(&self, user_id: &str) {
        let record = match self.store.get_participant(&self.room_id, user_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.broadcast_roster().await;
                return;
            }
            Err(e) => {
                warn!(
                    target: "sc.actor.room",
                    room_id = %self.room_id,
                    user_id = %user_id,
                    error = %e,
                    "Participant state broadcast skipped"
                );
                return;
            }
        };
        let Some(peer) = self.peer_by_user(user_id) else {
            self.broadcast_roster().await;
            return;
        };
        self.broadcast(ServerMessage::ParticipantStateChanged {
            participant: ParticipantInfo {
                peer_id: peer.connection_id.clone(),
                user_id: record.user_id,
                name: record.name,
                image_url: record.image_url,
                role: record.role,
                is_audio_muted: record.is_audio_muted,
                is_video_paused: record.is_video_paused,
                audio_locked: record.audio_locked,
                screen_share_locked: record.screen_share_locked,
            },
        })
        .await;
    }

    // ------------------------------------------------------------------
    // Media lifecycle
    // ------------------------------------------------------------------

    async fn handle_get_capabilities(
        &self,
        connection_id: &str,
    ) -> Result<serde_json::Value, ScError> {
        if !self.peers.contains_key(connection_id) {
            return Err(ScError::PeerNotFound);
        }
        self.media
            .router_capabilities(&self.router_id)
            .await
            .map_err(|e| ScError::Media(e.to_string()))
    }

    async fn handle_create_transport(
        &mut self,
        connection_id: &str,
        direction: TransportDirection,
    ) -> Result<TransportParams, ScError> {
        if !self.peers.contains_key(connection_id) {
            return Err(ScError::PeerNotFound);
        }

        let params = self
            .media
            .create_transport(&self.router_id, direction)
            .await
            .map_err(|e| ScError::Media(e.to_string()))?;

        if let Some(peer) = self.peers.get_mut(connection_id) {
            peer.transports.insert(params.transport_id.clone(), direction);
        }
        Ok(params)
    }

    async fn handle_connect_transport(
        &self,
        connection_id: &str,
        transport_id: &str,
        dtls_parameters: serde_json::Value,
    ) -> Result<(), ScError> {
        let peer = self.peers.get(connection_id).ok_or(ScError::PeerNotFound)?;
        if !peer.transports.contains_key(transport_id) {
            return Err(ScError::TransportNotFound);
        }

        self.media
            .connect_transport(transport_id, dtls_parameters)
            .await
            .map_err(|e| ScError::Media(e.to_string()))
    }

    async fn handle_produce(
        &mut self,
        connection_id: &str,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
        screen_share: bool,
    ) -> Result<String, ScError> {
        let (user_id, has_transport) = {
            let peer = self.peers.get(connection_id).ok_or(ScError::PeerNotFound)?;
            (
                peer.user_id.clone(),
                peer.transports.contains_key(transport_id),
            )
        };
        if !has_transport {
            return Err(ScError::TransportNotFound);
        }

        // Lock checks always go against persisted state, not cached flags.
        let record = self
            .store
            .get_participant(&self.room_id, &user_id)
            .await
            .map_err(|e| ScError::Storage(e.to_string()))?
            .ok_or(ScError::PeerNotFound)?;
        let exempt = record.role.is_privileged();

        if kind == MediaKind::Audio && record.audio_locked && !exempt {
            return Err(ScError::PermissionDenied(DenyReason::AudioLockedByAdmin));
        }
        if screen_share && !exempt {
            if record.screen_share_locked {
                return Err(ScError::PermissionDenied(
                    DenyReason::ScreenShareLockedByAdmin,
                ));
            }
            if !self.screen_share_enabled {
                return Err(ScError::PermissionDenied(DenyReason::ScreenShareDisabled));
            }
        }

        let producer_id = self
            .media
            .produce(transport_id, kind, rtp_parameters)
            .await
            .map_err(|e| ScError::Media(e.to_string()))?;

        if let Some(peer) = self.peers.get_mut(connection_id) {
            peer.producers
                .insert(producer_id.clone(), ProducerEntry { kind, screen_share });
        }

        self.broadcast_except(
            connection_id,
            ServerMessage::NewProducer {
                producer_id: producer_id.clone(),
                peer_id: connection_id.to_string(),
                user_id,
                kind,
                screen_share,
            },
        )
        .await;

        Ok(producer_id)
    }

    async fn handle_consume(
        &mut self,
        connection_id: &str,
        transport_id: &str,
        producer_id: &str,
        rtp_capabilities: serde_json::Value,
    ) -> Result<ConsumeOutcome, ScError> {
        {
            let peer = self.peers.get(connection_id).ok_or(ScError::PeerNotFound)?;
            match peer.transports.get(transport_id) {
                None => return Err(ScError::TransportNotFound),
                Some(TransportDirection::Send) => {
                    return Err(ScError::BadRequest(
                        "Consuming requires a recv transport".to_string(),
                    ));
                }
                Some(TransportDirection::Recv) => {}
            }
        }

        // Look up the source producer across all peers in the room.
        let source = self.peers.values().find_map(|peer| {
            peer.producers
                .get(producer_id)
                .map(|entry| (peer.connection_id.clone(), peer.user_id.clone(), *entry))
        });
        let (owner_peer_id, owner_user_id, entry) = source.ok_or(ScError::ProducerNotFound)?;

        let compatible = self
            .media
            .can_consume(&self.router_id, producer_id, &rtp_capabilities)
            .await
            .map_err(|e| ScError::Media(e.to_string()))?;
        if !compatible {
            return Err(ScError::IncompatibleMedia);
        }

        let params = self
            .media
            .consume(transport_id, producer_id, rtp_capabilities)
            .await
            .map_err(|e| match e {
                crate::media::MediaError::Incompatible(_) => ScError::IncompatibleMedia,
                other => ScError::Media(other.to_string()),
            })?;

        if let Some(peer) = self.peers.get_mut(connection_id) {
            peer.consumers.insert(
                params.consumer_id.clone(),
                ConsumerEntry {
                    producer_id: producer_id.to_string(),
                },
            );
        }

        Ok(ConsumeOutcome {
            params,
            peer_id: owner_peer_id,
            user_id: owner_user_id,
            screen_share: entry.screen_share,
        })
    }

    async fn handle_resume_consumer(
        &self,
        connection_id: &str,
        consumer_id: &str,
    ) -> Result<(), ScError> {
        let peer = self.peers.get(connection_id).ok_or(ScError::PeerNotFound)?;
        if !peer.consumers.contains_key(consumer_id) {
            return Err(ScError::ConsumerNotFound);
        }

        self.media
            .resume_consumer(consumer_id)
            .await
            .map_err(|e| ScError::Media(e.to_string()))
    }

    async fn handle_close_producer(
        &mut self,
        connection_id: &str,
        producer_id: &str,
    ) -> Result<(), ScError> {
        let entry = {
            let peer = self.peers.get(connection_id).ok_or(ScError::PeerNotFound)?;
            // Owner-only: a producer under another peer is not visible here.
            *peer.producers.get(producer_id).ok_or(ScError::ProducerNotFound)?
        };

        let cascaded = self
            .media
            .close_producer(producer_id)
            .await
            .map_err(|e| ScError::Media(e.to_string()))?;
        self.drop_producer_bookkeeping(connection_id, producer_id, &cascaded);

        self.broadcast(ServerMessage::ProducerClosed {
            producer_id: producer_id.to_string(),
            peer_id: connection_id.to_string(),
            kind: entry.kind,
            screen_share: entry.screen_share,
        })
        .await;

        Ok(())
    }

    /// Remove a closed producer and its cascade-closed consumers from
    /// every peer's bookkeeping.
    fn drop_producer_bookkeeping(
        &mut self,
        owner_connection_id: &str,
        producer_id: &str,
        cascaded_consumers: &[String],
    ) {
        if let Some(owner) = self.peers.get_mut(owner_connection_id) {
            owner.producers.remove(producer_id);
        }
        for peer in self.peers.values_mut() {
            for consumer_id in cascaded_consumers {
                peer.consumers.remove(consumer_id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Privileged control pipeline
    // ------------------------------------------------------------------

    async fn handle_control(
        &mut self,
        connection_id: &str,
        action: ControlAction,
        target_id: Option<&str>,
    ) -> Result<(), ScError> {
        let actor_user_id = self
            .peers
            .get(connection_id)
            .map(|p| p.user_id.clone())
            .ok_or(ScError::PeerNotFound)?;

        // Rate limit first: it applies regardless of permission validity.
        if !self.rate_limiter.check(&actor_user_id) {
            let reason = DenyReason::RateLimitExceeded;
            self.audit.record_decision(
                &self.room_id,
                &actor_user_id,
                target_id,
                action,
                false,
                Some(reason),
            );
            self.metrics.record_control_denial(reason.as_str());
            return Err(ScError::PermissionDenied(reason));
        }

        // Roles come from persisted state, never from cached flags.
        let actor_role = self
            .store
            .get_participant(&self.room_id, &actor_user_id)
            .await
            .map_err(|e| ScError::Storage(e.to_string()))?
            .map(|r| r.role);

        let target = match target_id {
            None => None,
            Some(target_user_id) => {
                let record = self
                    .store
                    .get_participant(&self.room_id, target_user_id)
                    .await
                    .map_err(|e| ScError::Storage(e.to_string()))?;
                Some(TargetContext {
                    role: record.map(|r| r.role),
                    is_self: target_user_id == actor_user_id,
                    is_creator: self
                        .creator_id
                        .as_deref()
                        .is_some_and(|creator| creator == target_user_id),
                })
            }
        };

        let decision = self.engine.check(&PermissionRequest {
            actor_role,
            action,
            target,
        });

        if !decision.allowed {
            let reason = decision.reason.unwrap_or(DenyReason::PermissionCheckError);
            if decision.should_audit {
                self.audit.record_decision(
                    &self.room_id,
                    &actor_user_id,
                    target_id,
                    action,
                    false,
                    Some(reason),
                );
            }
            self.metrics.record_control_denial(reason.as_str());
            debug!(
                target: "sc.control",
                room_id = %self.room_id,
                actor = %actor_user_id,
                action = action.as_str(),
                reason = reason.as_str(),
                "Control action denied"
            );
            return Err(ScError::PermissionDenied(reason));
        }

        self.apply_control(&actor_user_id, action, target_id).await?;

        self.audit.record_decision(
            &self.room_id,
            &actor_user_id,
            target_id,
            action,
            true,
            None,
        );
        info!(
            target: "sc.control",
            room_id = %self.room_id,
            actor = %actor_user_id,
            action = action.as_str(),
            target = target_id.unwrap_or("-"),
            "Control action applied"
        );

        // Targeted moderation broadcasts the one affected participant;
        // removals and room-wide changes re-broadcast the full roster.
        match target_id {
            Some(target) if action != ControlAction::RemoveParticipant => {
                self.broadcast_participant_state(target).await;
            }
            _ => self.broadcast_roster().await,
        }
        Ok(())
    }

    /// Apply an allowed control action: persisted-state update, then
    /// direct notification of the affected connection(s).
    async fn apply_control(
        &mut self,
        actor_user_id: &str,
        action: ControlAction,
        target_id: Option<&str>,
    ) -> Result<(), ScError> {
        match action {
            ControlAction::MuteParticipant => {
                let target = target_required(target_id)?;
                self.update_target(
                    target,
                    ParticipantUpdate {
                        is_audio_muted: Some(true),
                        audio_locked: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
                self.notify_user(target, ServerMessage::ForceMute).await;
            }

            ControlAction::UnmuteParticipant => {
                // Clears the lock; the participant unmutes themselves.
                let target = target_required(target_id)?;
                self.update_target(
                    target,
                    ParticipantUpdate {
                        audio_locked: Some(false),
                        ..Default::default()
                    },
                )
                .await?;
                self.notify_user(target, ServerMessage::AllowUnmute).await;
            }

            ControlAction::MuteAll => {
                let affected = self
                    .store
                    .update_by_role(
                        &self.room_id,
                        Role::Participant,
                        ParticipantUpdate {
                            is_audio_muted: Some(true),
                            audio_locked: Some(true),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|e| ScError::Storage(e.to_string()))?;
                self.audio_lock_active = true;
                self.notify_users(&affected, ServerMessage::ForceMute).await;
            }

            ControlAction::UnmuteAll => {
                let affected = self
                    .store
                    .update_by_role(
                        &self.room_id,
                        Role::Participant,
                        ParticipantUpdate {
                            audio_locked: Some(false),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|e| ScError::Storage(e.to_string()))?;
                self.audio_lock_active = false;
                self.notify_users(&affected, ServerMessage::AllowUnmute).await;
            }

            ControlAction::DisableCamera => {
                let target = target_required(target_id)?;
                self.update_target(
                    target,
                    ParticipantUpdate {
                        is_video_paused: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
                self.notify_user(target, ServerMessage::ForceVideoPause).await;
            }

            ControlAction::EnableCamera => {
                let target = target_required(target_id)?;
                self.update_target(
                    target,
                    ParticipantUpdate {
                        is_video_paused: Some(false),
                        ..Default::default()
                    },
                )
                .await?;
                self.notify_user(target, ServerMessage::AllowVideoResume).await;
            }

            ControlAction::DisableAllCameras => {
                let affected = self
                    .store
                    .update_by_role(
                        &self.room_id,
                        Role::Participant,
                        ParticipantUpdate {
                            is_video_paused: Some(true),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|e| ScError::Storage(e.to_string()))?;
                self.video_lock_active = true;
                self.notify_users(&affected, ServerMessage::ForceVideoPause)
                    .await;
            }

            ControlAction::EnableAllCameras => {
                let affected = self
                    .store
                    .update_by_role(
                        &self.room_id,
                        Role::Participant,
                        ParticipantUpdate {
                            is_video_paused: Some(false),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|e| ScError::Storage(e.to_string()))?;
                self.video_lock_active = false;
                self.notify_users(&affected, ServerMessage::AllowVideoResume)
                    .await;
            }

            ControlAction::EnableScreenShare => {
                self.screen_share_enabled = true;
                self.store
                    .update_by_role(
                        &self.room_id,
                        Role::Participant,
                        ParticipantUpdate {
                            screen_share_locked: Some(false),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|e| ScError::Storage(e.to_string()))?;
                self.broadcast(ServerMessage::ScreenShareGlobalUpdate { enabled: true })
                    .await;
            }

            ControlAction::DisableScreenShare => {
                self.screen_share_enabled = false;
                self.store
                    .update_by_role(
                        &self.room_id,
                        Role::Participant,
                        ParticipantUpdate {
                            screen_share_locked: Some(true),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|e| ScError::Storage(e.to_string()))?;
                self.broadcast(ServerMessage::ScreenShareGlobalUpdate { enabled: false })
                    .await;
            }

            ControlAction::PromoteCoHost => {
                let target = target_required(target_id)?;
                self.change_role(target, Role::CoHost).await?;
                self.grant_lock_exemptions(target).await?;
                self.notify_user(target, ServerMessage::CoHostGranted).await;
            }

            ControlAction::DemoteCoHost => {
                let target = target_required(target_id)?;
                self.change_role(target, Role::Participant).await?;
                self.reapply_active_locks(target).await?;
                self.notify_user(target, ServerMessage::CoHostRevoked).await;
            }

            ControlAction::PromoteHost => {
                let target = target_required(target_id)?;
                self.change_role(target, Role::Host).await?;
                self.grant_lock_exemptions(target).await?;
                self.notify_user(target, ServerMessage::HostGranted).await;
            }

            ControlAction::DemoteHost => {
                let target = target_required(target_id)?;
                self.change_role(target, Role::Participant).await?;
                self.reapply_active_locks(target).await?;
                self.notify_user(target, ServerMessage::HostRevoked).await;
            }

            ControlAction::RemoveParticipant => {
                let target = target_required(target_id)?;
                self.remove_participant(actor_user_id, target).await?;
            }
        }
        Ok(())
    }

    async fn update_target(
        &self,
        target_user_id: &str,
        update: ParticipantUpdate,
    ) -> Result<(), ScError> {
        self.store
            .update_participant(&self.room_id, target_user_id, update)
            .await
            .map_err(|e| ScError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn change_role(&mut self, target_user_id: &str, role: Role) -> Result<(), ScError> {
        self.update_target(
            target_user_id,
            ParticipantUpdate {
                role: Some(role),
                ..Default::default()
            },
        )
        .await?;

        // Mirror the new role onto the live peer's cached flags.
        if let Some(peer) = self
            .peers
            .values_mut()
            .find(|p| p.user_id == target_user_id)
        {
            peer.is_host = role == Role::Host;
            peer.is_co_host = role == Role::CoHost;
        }
        Ok(())
    }

    /// On promotion: a participant who was a victim of an active
    /// room-wide lock regains control immediately, without waiting for
    /// an unlock broadcast.
    async fn grant_lock_exemptions(&self, target_user_id: &str) -> Result<(), ScError> {
        if self.audio_lock_active {
            self.update_target(
                target_user_id,
                ParticipantUpdate {
                    audio_locked: Some(false),
                    ..Default::default()
                },
            )
            .await?;
            self.notify_user(target_user_id, ServerMessage::AllowUnmute).await;
        }
        if self.video_lock_active {
            self.update_target(
                target_user_id,
                ParticipantUpdate {
                    is_video_paused: Some(false),
                    ..Default::default()
                },
            )
            .await?;
            self.notify_user(target_user_id, ServerMessage::AllowVideoResume)
                .await;
        }
        Ok(())
    }

    /// On demotion: mirror of [`RoomActor::grant_lock_exemptions`] —
    /// active room-wide locks are re-applied to the demoted participant.
    async fn reapply_active_locks(&self, target_user_id: &str) -> Result<(), ScError> {
        if self.audio_lock_active {
            self.update_target(
                target_user_id,
                ParticipantUpdate {
                    is_audio_muted: Some(true),
                    audio_locked: Some(true),
                    ..Default::default()
                },
            )
            .await?;
            self.notify_user(target_user_id, ServerMessage::ForceMute).await;
        }
        if self.video_lock_active {
            self.update_target(
                target_user_id,
                ParticipantUpdate {
                    is_video_paused: Some(true),
                    ..Default::default()
                },
            )
            .await?;
            self.notify_user(target_user_id, ServerMessage::ForceVideoPause)
                .await;
        }
        Ok(())
    }

    async fn remove_participant(
        &mut self,
        actor_user_id: &str,
        target_user_id: &str,
    ) -> Result<(), ScError> {
        info!(
            target: "sc.control",
            room_id = %self.room_id,
            actor = %actor_user_id,
            target = %target_user_id,
            "Removing participant"
        );

        // The target may already have disconnected; the removal still
        // applies to persisted state.
        let live = self
            .peer_by_user(target_user_id)
            .map(|p| p.connection_id.clone());

        if let Some(connection_id) = &live {
            self.notify_user(
                target_user_id,
                ServerMessage::Kicked {
                    reason: "Removed by a host".to_string(),
                },
            )
            .await;
            self.broadcast_participant_left(connection_id).await;
            self.teardown_peer(connection_id).await;
        }

        if let Err(e) = self
            .store
            .delete_participant(&self.room_id, target_user_id)
            .await
        {
            warn!(
                target: "sc.actor.room",
                room_id = %self.room_id,
                user_id = %target_user_id,
                error = %e,
                "Participant delete failed during removal"
            );
        }
        self.rate_limiter.forget(target_user_id);

        self.check_empty().await;
        Ok(())
    }

    /// Directly notify one user's live connection. A missing live peer
    /// is fine: the target may have disconnected mid-flight.
    async fn notify_user(&self, user_id: &str, message: ServerMessage) {
        if let Some(peer) = self.peer_by_user(user_id) {
            peer.events.deliver(message).await;
        }
    }

    async fn notify_users(&self, user_ids: &[String], message: ServerMessage) {
        for user_id in user_ids {
            self.notify_user(user_id, message.clone()).await;
        }
    }

    // ------------------------------------------------------------------
    // Disconnect / teardown
    // ------------------------------------------------------------------

    async fn handle_disconnect(&mut self, connection_id: &str) {
        let Some(peer) = self.peers.get(connection_id) else {
            return;
        };
        let user_id = peer.user_id.clone();

        info!(
            target: "sc.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            user_id = %user_id,
            "Peer disconnecting"
        );

        // Broadcast first so live UIs react before resources vanish.
        self.broadcast_participant_left(connection_id).await;

        self.teardown_peer(connection_id).await;

        // Teardown completes even when the persistence delete fails.
        if let Err(e) = self.store.delete_participant(&self.room_id, &user_id).await {
            warn!(
                target: "sc.actor.room",
                room_id = %self.room_id,
                user_id = %user_id,
                error = %e,
                "Participant delete failed on disconnect"
            );
        }
        self.rate_limiter.forget(&user_id);

        self.broadcast_roster().await;
        self.check_empty().await;
    }

    async fn broadcast_participant_left(&self, connection_id: &str) {
        if let Some(peer) = self.peers.get(connection_id) {
            self.broadcast_except(
                connection_id,
                ServerMessage::ParticipantLeft {
                    peer_id: connection_id.to_string(),
                    user_id: peer.user_id.clone(),
                },
            )
            .await;
        }
    }

    /// Close all of a peer's resources and remove the peer entry.
    ///
    /// Consumers first, then producers, then transports. Each close is
    /// best-effort: a failure is logged and the walk continues, so one
    /// bad resource never blocks the rest of the teardown.
    async fn teardown_peer(&mut self, connection_id: &str) {
        let Some(peer) = self.peers.remove(connection_id) else {
            return;
        };

        for consumer_id in peer.consumers.keys() {
            if let Err(e) = self.media.close_consumer(consumer_id).await {
                warn!(
                    target: "sc.actor.room",
                    room_id = %self.room_id,
                    consumer_id = %consumer_id,
                    error = %e,
                    "Consumer close failed during teardown"
                );
            }
        }

        for (producer_id, entry) in &peer.producers {
            match self.media.close_producer(producer_id).await {
                Ok(cascaded) => {
                    for peer in self.peers.values_mut() {
                        for consumer_id in &cascaded {
                            peer.consumers.remove(consumer_id);
                        }
                    }
                    self.broadcast(ServerMessage::ProducerClosed {
                        producer_id: producer_id.clone(),
                        peer_id: connection_id.to_string(),
                        kind: entry.kind,
                        screen_share: entry.screen_share,
                    })
                    .await;
                }
                Err(e) => {
                    warn!(
                        target: "sc.actor.room",
                        room_id = %self.room_id,
                        producer_id = %producer_id,
                        error = %e,
                        "Producer close failed during teardown"
                    );
                }
            }
        }

        for transport_id in peer.transports.keys() {
            if let Err(e) = self.media.close_transport(transport_id).await {
                warn!(
                    target: "sc.actor.room",
                    room_id = %self.room_id,
                    transport_id = %transport_id,
                    error = %e,
                    "Transport close failed during teardown"
                );
            }
        }

        // Close through the mailbox so any already-queued notices (e.g.
        // a kick) are delivered before the socket drops.
        peer.events.close("peer teardown".to_string()).await;
        self.metrics.peer_left();
    }

    /// A room with zero peers releases its routing context and removes
    /// itself from the registry.
    async fn check_empty(&mut self) {
        if !self.peers.is_empty() {
            return;
        }

        info!(
            target: "sc.actor.room",
            room_id = %self.room_id,
            "Room empty, releasing routing context"
        );
        match self.media.close_router(&self.router_id).await {
            Ok(()) => self.router_released = true,
            Err(e) => {
                warn!(
                    target: "sc.actor.room",
                    room_id = %self.room_id,
                    error = %e,
                    "Router close failed"
                );
            }
        }

        let _ = self
            .registry
            .send(RegistryMessage::RoomEmpty {
                room_id: self.room_id.clone(),
            })
            .await;
        self.cancel_token.cancel();
    }

    /// Tear down every remaining peer on cancellation.
    async fn graceful_shutdown(&mut self) {
        let connection_ids: Vec<String> = self.peers.keys().cloned().collect();
        for connection_id in connection_ids {
            self.teardown_peer(&connection_id).await;
        }
        // The empty-room path releases the router before cancelling.
        if !self.router_released {
            if let Err(e) = self.media.close_router(&self.router_id).await {
                debug!(
                    target: "sc.actor.room",
                    room_id = %self.room_id,
                    error = %e,
                    "Router close failed during shutdown"
                );
            }
        }
    }
}

fn target_required(target_id: Option<&str>) -> Result<&str, ScError> {
    target_id.ok_or_else(|| ScError::BadRequest("A target is required".to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::connection::ConnectionActor;
    use crate::media::LocalMediaEngine;
    use crate::storage::MemoryStore;

    struct TestRoom {
        handle: RoomActorHandle,
        registry_rx: mpsc::Receiver<RegistryMessage>,
        store: Arc<MemoryStore>,
    }

    async fn spawn_room() -> TestRoom {
        spawn_room_with_capacity(100).await
    }

    async fn spawn_room_with_capacity(max_peers: usize) -> TestRoom {
        let media = Arc::new(LocalMediaEngine::new());
        let store = Arc::new(MemoryStore::new());
        let router_id = media.create_router("room-1").await.unwrap();
        let (registry_tx, registry_rx) = mpsc::channel(10);

        let (handle, _task) = RoomActor::spawn(
            "room-1".to_string(),
            router_id,
            CancellationToken::new(),
            registry_tx,
            Arc::clone(&media) as Arc<dyn MediaEngine>,
            Arc::clone(&store) as Arc<dyn SessionStore>,
            RateLimitConfig::default(),
            100,
            max_peers,
            RegistryMetrics::new(),
        );

        TestRoom {
            handle,
            registry_rx,
            store,
        }
    }

    async fn join(
        room: &RoomActorHandle,
        connection_id: &str,
        user_id: &str,
    ) -> (JoinOutcome, mpsc::Receiver<String>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(100);
        let (events, _task) = ConnectionActor::spawn(
            connection_id.to_string(),
            room.child_token(),
            outbound_tx,
        );
        let outcome = room
            .join(
                connection_id.to_string(),
                user_id.to_string(),
                user_id.to_string(),
                None,
                events,
            )
            .await
            .unwrap();
        (outcome, outbound_rx)
    }

    #[tokio::test]
    async fn test_first_joiner_becomes_host() {
        let room = spawn_room().await;
        let (host, _rx) = join(&room.handle, "conn-1", "alice").await;
        let (participant, _rx2) = join(&room.handle, "conn-2", "bob").await;

        assert_eq!(host.role, Role::Host);
        assert_eq!(participant.role, Role::Participant);
        assert_eq!(participant.participants.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_join_is_idempotent() {
        let room = spawn_room().await;
        let (first, _rx) = join(&room.handle, "conn-1", "alice").await;
        let (second, _rx2) = join(&room.handle, "conn-1", "alice").await;

        assert!(!first.rejoin);
        assert!(second.rejoin);
        assert_eq!(first.role, second.role);

        let state = room.handle.get_state().await.unwrap();
        assert_eq!(state.peer_count, 1);
    }

    #[tokio::test]
    async fn test_rejoin_with_different_user_is_rejected() {
        let room = spawn_room().await;
        let (_, _rx) = join(&room.handle, "conn-1", "alice").await;

        let (outbound_tx, _outbound_rx) = mpsc::channel(10);
        let (events, _task) =
            ConnectionActor::spawn("conn-1".to_string(), room.handle.child_token(), outbound_tx);
        let result = room
            .handle
            .join(
                "conn-1".to_string(),
                "bob".to_string(),
                "Bob".to_string(),
                None,
                events,
            )
            .await;
        assert!(matches!(result, Err(ScError::Conflict(_))));

        // No orphan record was persisted and the live peer keeps its
        // original identity.
        assert!(room
            .store
            .get_participant("room-1", "bob")
            .await
            .unwrap()
            .is_none());
        let (outcome, _rx2) = join(&room.handle, "conn-1", "alice").await;
        assert!(outcome.rejoin);
    }

    #[tokio::test]
    async fn test_full_room_rejects_new_peers() {
        let room = spawn_room_with_capacity(1).await;
        let (_, _rx) = join(&room.handle, "conn-1", "alice").await;

        let (outbound_tx, _outbound_rx) = mpsc::channel(10);
        let (events, _task) =
            ConnectionActor::spawn("conn-2".to_string(), room.handle.child_token(), outbound_tx);
        let result = room
            .handle
            .join(
                "conn-2".to_string(),
                "bob".to_string(),
                "Bob".to_string(),
                None,
                events,
            )
            .await;
        assert!(matches!(result, Err(ScError::Conflict(_))));

        // The peer already inside is unaffected, including rejoins.
        let (outcome, _rx2) = join(&room.handle, "conn-1", "alice").await;
        assert!(outcome.rejoin);
    }

    #[tokio::test]
    async fn test_join_advertises_existing_producers() {
        let room = spawn_room().await;
        let (_, _rx) = join(&room.handle, "conn-1", "alice").await;

        let transport = room
            .handle
            .create_transport("conn-1".to_string(), TransportDirection::Send)
            .await
            .unwrap();
        let producer_id = room
            .handle
            .produce(
                "conn-1".to_string(),
                transport.transport_id,
                MediaKind::Video,
                serde_json::json!({}),
                false,
            )
            .await
            .unwrap();

        let (outcome, _rx2) = join(&room.handle, "conn-2", "bob").await;
        assert_eq!(outcome.producers.len(), 1);
        assert_eq!(outcome.producers.first().unwrap().producer_id, producer_id);
        assert_eq!(outcome.producers.first().unwrap().user_id, "alice");
    }

    #[tokio::test]
    async fn test_consume_requires_recv_transport() {
        let room = spawn_room().await;
        let (_, _rx) = join(&room.handle, "conn-1", "alice").await;
        let (_, _rx2) = join(&room.handle, "conn-2", "bob").await;

        let send = room
            .handle
            .create_transport("conn-1".to_string(), TransportDirection::Send)
            .await
            .unwrap();
        let producer_id = room
            .handle
            .produce(
                "conn-1".to_string(),
                send.transport_id,
                MediaKind::Audio,
                serde_json::json!({}),
                false,
            )
            .await
            .unwrap();

        let bob_send = room
            .handle
            .create_transport("conn-2".to_string(), TransportDirection::Send)
            .await
            .unwrap();
        let result = room
            .handle
            .consume(
                "conn-2".to_string(),
                bob_send.transport_id,
                producer_id.clone(),
                serde_json::json!({ "codecs": [{}] }),
            )
            .await;
        assert!(matches!(result, Err(ScError::BadRequest(_))));

        let bob_recv = room
            .handle
            .create_transport("conn-2".to_string(), TransportDirection::Recv)
            .await
            .unwrap();
        let outcome = room
            .handle
            .consume(
                "conn-2".to_string(),
                bob_recv.transport_id,
                producer_id,
                serde_json::json!({ "codecs": [{}] }),
            )
            .await
            .unwrap();
        assert_eq!(outcome.user_id, "alice");
        assert_eq!(outcome.params.kind, MediaKind::Audio);
    }

    #[tokio::test]
    async fn test_empty_room_notifies_registry() {
        let mut room = spawn_room().await;
        let (_, _rx) = join(&room.handle, "conn-1", "alice").await;

        room.handle.disconnect("conn-1".to_string()).await;

        let msg = room.registry_rx.recv().await.unwrap();
        assert!(matches!(
            msg,
            RegistryMessage::RoomEmpty { room_id } if room_id == "room-1"
        ));
    }

    #[tokio::test]
    async fn test_mute_all_locks_participants_and_blocks_produce() {
        let room = spawn_room().await;
        let (_, _host_rx) = join(&room.handle, "conn-1", "alice").await;
        let (_, _p_rx) = join(&room.handle, "conn-2", "bob").await;

        room.handle
            .control("conn-1".to_string(), ControlAction::MuteAll, None)
            .await
            .unwrap();

        let bob = room
            .store
            .get_participant("room-1", "bob")
            .await
            .unwrap()
            .unwrap();
        assert!(bob.is_audio_muted);
        assert!(bob.audio_locked);

        // Host is exempt from the room-wide action.
        let alice = room
            .store
            .get_participant("room-1", "alice")
            .await
            .unwrap()
            .unwrap();
        assert!(!alice.audio_locked);

        let transport = room
            .handle
            .create_transport("conn-2".to_string(), TransportDirection::Send)
            .await
            .unwrap();
        let result = room
            .handle
            .produce(
                "conn-2".to_string(),
                transport.transport_id,
                MediaKind::Audio,
                serde_json::json!({}),
                false,
            )
            .await;
        assert!(matches!(
            result,
            Err(ScError::PermissionDenied(DenyReason::AudioLockedByAdmin))
        ));
    }

    #[tokio::test]
    async fn test_participant_cannot_issue_control_actions() {
        let room = spawn_room().await;
        let (_, _rx) = join(&room.handle, "conn-1", "alice").await;
        let (_, _rx2) = join(&room.handle, "conn-2", "bob").await;

        let result = room
            .handle
            .control("conn-2".to_string(), ControlAction::MuteAll, None)
            .await;
        assert!(matches!(
            result,
            Err(ScError::PermissionDenied(DenyReason::NoAdminPrivileges))
        ));

        let entries = room.handle.get_audit().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.first().unwrap().actor_id, "bob");
    }

    #[tokio::test]
    async fn test_remove_participant_tears_down_and_deletes() {
        let room = spawn_room().await;
        let (_, _rx) = join(&room.handle, "conn-1", "alice").await;
        let (_, _rx2) = join(&room.handle, "conn-2", "bob").await;

        let transport = room
            .handle
            .create_transport("conn-2".to_string(), TransportDirection::Send)
            .await
            .unwrap();
        room.handle
            .produce(
                "conn-2".to_string(),
                transport.transport_id,
                MediaKind::Audio,
                serde_json::json!({}),
                false,
            )
            .await
            .unwrap();

        room.handle
            .control(
                "conn-1".to_string(),
                ControlAction::RemoveParticipant,
                Some("bob".to_string()),
            )
            .await
            .unwrap();

        let state = room.handle.get_state().await.unwrap();
        assert_eq!(state.peer_count, 1);
        assert!(room
            .store
            .get_participant("room-1", "bob")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_creator_cannot_be_removed() {
        let room = spawn_room().await;
        let (_, _rx) = join(&room.handle, "conn-1", "alice").await;
        let (_, _rx2) = join(&room.handle, "conn-2", "bob").await;

        // Promote bob so the table itself would allow the removal.
        room.handle
            .control(
                "conn-1".to_string(),
                ControlAction::PromoteHost,
                Some("bob".to_string()),
            )
            .await
            .unwrap();

        let result = room
            .handle
            .control(
                "conn-2".to_string(),
                ControlAction::RemoveParticipant,
                Some("alice".to_string()),
            )
            .await;
        assert!(matches!(
            result,
            Err(ScError::PermissionDenied(DenyReason::CannotKickCreator))
        ));
    }

    #[tokio::test]
    async fn test_promote_demote_lock_round_trip() {
        let room = spawn_room().await;
        let (_, _rx) = join(&room.handle, "conn-1", "alice").await;
        let (_, _rx2) = join(&room.handle, "conn-2", "bob").await;

        room.handle
            .control("conn-1".to_string(), ControlAction::MuteAll, None)
            .await
            .unwrap();
        let bob = room
            .store
            .get_participant("room-1", "bob")
            .await
            .unwrap()
            .unwrap();
        assert!(bob.audio_locked);

        // Promotion exempts bob from the active lock.
        room.handle
            .control(
                "conn-1".to_string(),
                ControlAction::PromoteCoHost,
                Some("bob".to_string()),
            )
            .await
            .unwrap();
        let bob = room
            .store
            .get_participant("room-1", "bob")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bob.role, Role::CoHost);
        assert!(!bob.audio_locked);

        // Demotion re-applies it.
        room.handle
            .control(
                "conn-1".to_string(),
                ControlAction::DemoteCoHost,
                Some("bob".to_string()),
            )
            .await
            .unwrap();
        let bob = room
            .store
            .get_participant("room-1", "bob")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bob.role, Role::Participant);
        assert!(bob.audio_locked);
        assert!(bob.is_audio_muted);
    }

    #[tokio::test]
    async fn test_screen_share_disabled_blocks_share_produce() {
        let room = spawn_room().await;
        let (_, _rx) = join(&room.handle, "conn-1", "alice").await;
        let (_, _rx2) = join(&room.handle, "conn-2", "bob").await;

        room.handle
            .control("conn-1".to_string(), ControlAction::DisableScreenShare, None)
            .await
            .unwrap();

        let transport = room
            .handle
            .create_transport("conn-2".to_string(), TransportDirection::Send)
            .await
            .unwrap();
        let result = room
            .handle
            .produce(
                "conn-2".to_string(),
                transport.transport_id,
                MediaKind::Video,
                serde_json::json!({}),
                true,
            )
            .await;
        assert!(matches!(
            result,
            Err(ScError::PermissionDenied(
                DenyReason::ScreenShareLockedByAdmin
            ))
        ));
    }
}
