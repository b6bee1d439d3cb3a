//! Message types for the actor system.
//!
//! Defines the messages passed between actors:
//! - `RegistryMessage`: sent to the `RoomRegistryActor`
//! - `RoomMessage`: sent to a `RoomActor`
//! - `ConnectionMessage`: sent to a `ConnectionActor`
//!
//! Request-style messages carry a `respond_to` oneshot sender; event-style
//! messages are fire-and-forget.

use crate::errors::ScError;
use crate::media::{ConsumerParams, TransportParams};
use crate::protocol::{MediaKind, ParticipantInfo, RemoteProducer, ServerMessage, TransportDirection};

use access_control::{AuditLogEntry, ControlAction, Role};
use tokio::sync::oneshot;

/// Messages handled by the `RoomRegistryActor`.
#[derive(Debug)]
pub enum RegistryMessage {
    /// Look up a room, creating it (and its routing context) if absent.
    GetOrCreateRoom {
        room_id: String,
        respond_to: oneshot::Sender<Result<super::room::RoomActorHandle, ScError>>,
    },

    /// A room's last peer left; remove it from the registry.
    RoomEmpty { room_id: String },

    /// Get registry status.
    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },

    /// Initiate graceful shutdown: stop accepting joins, drain rooms.
    Shutdown {
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },
}

/// Registry status snapshot.
#[derive(Debug, Clone)]
pub struct RegistryStatus {
    pub sc_id: String,
    pub room_count: usize,
    pub accepting_new: bool,
}

/// Messages handled by a `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    /// A connection completes the join handshake.
    Join {
        connection_id: String,
        user_id: String,
        name: String,
        image_url: Option<String>,
        events: super::connection::ConnectionActorHandle,
        respond_to: oneshot::Sender<Result<JoinOutcome, ScError>>,
    },

    /// Router RTP capabilities for client-side negotiation.
    GetCapabilities {
        connection_id: String,
        respond_to: oneshot::Sender<Result<serde_json::Value, ScError>>,
    },

    CreateTransport {
        connection_id: String,
        direction: TransportDirection,
        respond_to: oneshot::Sender<Result<TransportParams, ScError>>,
    },

    ConnectTransport {
        connection_id: String,
        transport_id: String,
        dtls_parameters: serde_json::Value,
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    Produce {
        connection_id: String,
        transport_id: String,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
        screen_share: bool,
        respond_to: oneshot::Sender<Result<String, ScError>>,
    },

    Consume {
        connection_id: String,
        transport_id: String,
        producer_id: String,
        rtp_capabilities: serde_json::Value,
        respond_to: oneshot::Sender<Result<ConsumeOutcome, ScError>>,
    },

    ResumeConsumer {
        connection_id: String,
        consumer_id: String,
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    /// Owner-only producer close (including stop-screen-share).
    CloseProducer {
        connection_id: String,
        producer_id: String,
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    /// A privileged control action (mute, promote, remove, ...).
    Control {
        connection_id: String,
        action: ControlAction,
        target_id: Option<String>,
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    /// Connection closed or participant left; tear down the peer.
    Disconnect { connection_id: String },

    /// Room state snapshot.
    GetState {
        respond_to: oneshot::Sender<RoomState>,
    },

    /// Audit entries recorded for this room, oldest first.
    GetAudit {
        respond_to: oneshot::Sender<Vec<AuditLogEntry>>,
    },
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub peer_id: String,
    pub role: Role,
    /// Whether this was a duplicate join answered with known state.
    pub rejoin: bool,
    pub participants: Vec<ParticipantInfo>,
    /// Producers already live in the room, so the joiner can consume.
    pub producers: Vec<RemoteProducer>,
}

/// Result of a successful consume.
#[derive(Debug, Clone)]
pub struct ConsumeOutcome {
    pub params: ConsumerParams,
    /// Peer owning the source producer.
    pub peer_id: String,
    pub user_id: String,
    pub screen_share: bool,
}

/// Room state snapshot.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room_id: String,
    pub peer_count: usize,
    pub screen_share_enabled: bool,
}

/// Messages handled by a `ConnectionActor`.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// Serialize and deliver a server event to this client.
    Deliver(ServerMessage),

    /// Close the client connection (e.g. after a kick).
    Close { reason: String },
}
