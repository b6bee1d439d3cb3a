//! Signaling protocol types.
//!
//! The wire format is JSON over a persistent WebSocket. Client frames
//! carry an `action` discriminant plus an optional `requestId` the
//! server echoes back in the matching `response`/`error` event; server
//! frames carry an `event` discriminant. Everything is decoded into
//! tagged unions here, at the boundary, before any handler runs.

use access_control::{ControlAction, Role};
use serde::{Deserialize, Serialize};

/// Media kind carried by a producer or consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Direction of a transport, from the client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    Send,
    Recv,
}

/// One inbound client frame: a request plus its correlation id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFrame {
    /// Echoed back in the matching `response` or `error` event.
    pub request_id: Option<u64>,
    #[serde(flatten)]
    pub request: ClientRequest,
}

/// All requests a client may send, discriminated by `action`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientRequest {
    #[serde(rename_all = "camelCase")]
    Join {
        room_id: String,
        user_id: String,
        name: String,
        image_url: Option<String>,
    },
    GetRouterCapabilities,
    #[serde(rename_all = "camelCase")]
    CreateTransport { direction: TransportDirection },
    #[serde(rename_all = "camelCase")]
    ConnectTransport {
        transport_id: String,
        dtls_parameters: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    Produce {
        transport_id: String,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
        #[serde(default)]
        screen_share: bool,
    },
    #[serde(rename_all = "camelCase")]
    Consume {
        transport_id: String,
        producer_id: String,
        rtp_capabilities: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    ResumeConsumer { consumer_id: String },
    #[serde(rename_all = "camelCase")]
    CloseProducer { producer_id: String },
    Leave,

    // Privileged control actions. Named individually on the wire so
    // clients match on `action` without a nested payload schema.
    #[serde(rename_all = "camelCase")]
    MuteParticipant { target_id: String },
    #[serde(rename_all = "camelCase")]
    UnmuteParticipant { target_id: String },
    MuteAll,
    UnmuteAll,
    #[serde(rename_all = "camelCase")]
    DisableCamera { target_id: String },
    #[serde(rename_all = "camelCase")]
    EnableCamera { target_id: String },
    DisableAllCameras,
    EnableAllCameras,
    /// Room-wide screen share toggle.
    #[serde(rename_all = "camelCase")]
    SetScreenShare { enabled: bool },
    #[serde(rename_all = "camelCase")]
    PromoteCoHost { target_id: String },
    #[serde(rename_all = "camelCase")]
    DemoteCoHost { target_id: String },
    #[serde(rename_all = "camelCase")]
    PromoteHost { target_id: String },
    #[serde(rename_all = "camelCase")]
    DemoteHost { target_id: String },
    #[serde(rename_all = "camelCase")]
    RemoveParticipant { target_id: String },
}

impl ClientRequest {
    /// Maps a privileged request onto its policy action and target, or
    /// `None` for plain session/media requests.
    #[must_use]
    pub fn control_action(&self) -> Option<(ControlAction, Option<&str>)> {
        match self {
            ClientRequest::MuteParticipant { target_id } => {
                Some((ControlAction::MuteParticipant, Some(target_id)))
            }
            ClientRequest::UnmuteParticipant { target_id } => {
                Some((ControlAction::UnmuteParticipant, Some(target_id)))
            }
            ClientRequest::MuteAll => Some((ControlAction::MuteAll, None)),
            ClientRequest::UnmuteAll => Some((ControlAction::UnmuteAll, None)),
            ClientRequest::DisableCamera { target_id } => {
                Some((ControlAction::DisableCamera, Some(target_id)))
            }
            ClientRequest::EnableCamera { target_id } => {
                Some((ControlAction::EnableCamera, Some(target_id)))
            }
            ClientRequest::DisableAllCameras => Some((ControlAction::DisableAllCameras, None)),
            ClientRequest::EnableAllCameras => Some((ControlAction::EnableAllCameras, None)),
            ClientRequest::SetScreenShare { enabled: true } => {
                Some((ControlAction::EnableScreenShare, None))
            }
            ClientRequest::SetScreenShare { enabled: false } => {
                Some((ControlAction::DisableScreenShare, None))
            }
            ClientRequest::PromoteCoHost { target_id } => {
                Some((ControlAction::PromoteCoHost, Some(target_id)))
            }
            ClientRequest::DemoteCoHost { target_id } => {
                Some((ControlAction::DemoteCoHost, Some(target_id)))
            }
            ClientRequest::PromoteHost { target_id } => {
                Some((ControlAction::PromoteHost, Some(target_id)))
            }
            ClientRequest::DemoteHost { target_id } => {
                Some((ControlAction::DemoteHost, Some(target_id)))
            }
            ClientRequest::RemoveParticipant { target_id } => {
                Some((ControlAction::RemoveParticipant, Some(target_id)))
            }
            _ => None,
        }
    }
}

/// One participant entry in a roster broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub peer_id: String,
    pub user_id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub role: Role,
    pub is_audio_muted: bool,
    pub is_video_paused: bool,
    pub audio_locked: bool,
    pub screen_share_locked: bool,
}

/// A remote producer advertised to a (re)joining participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProducer {
    pub producer_id: String,
    pub peer_id: String,
    pub user_id: String,
    pub kind: MediaKind,
    pub screen_share: bool,
}

/// All server-to-client frames, discriminated by `event`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Successful reply to a client request.
    #[serde(rename_all = "camelCase")]
    Response {
        request_id: Option<u64>,
        data: serde_json::Value,
    },
    /// Failed reply to a client request.
    #[serde(rename_all = "camelCase")]
    Error {
        request_id: Option<u64>,
        code: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        message: String,
    },

    /// Full roster of the room after any membership or room-wide change.
    #[serde(rename_all = "camelCase")]
    ParticipantList { participants: Vec<ParticipantInfo> },
    /// One participant's state changed (targeted moderation, role change).
    #[serde(rename_all = "camelCase")]
    ParticipantStateChanged { participant: ParticipantInfo },
    /// A participant's connection is going away; sent before teardown.
    #[serde(rename_all = "camelCase")]
    ParticipantLeft { peer_id: String, user_id: String },

    #[serde(rename_all = "camelCase")]
    NewProducer {
        producer_id: String,
        peer_id: String,
        user_id: String,
        kind: MediaKind,
        screen_share: bool,
    },
    #[serde(rename_all = "camelCase")]
    ProducerClosed {
        producer_id: String,
        peer_id: String,
        kind: MediaKind,
        screen_share: bool,
    },

    // Targeted moderation notices.
    ForceMute,
    AllowUnmute,
    ForceVideoPause,
    AllowVideoResume,
    CoHostGranted,
    CoHostRevoked,
    HostGranted,
    HostRevoked,
    #[serde(rename_all = "camelCase")]
    Kicked { reason: String },

    /// Room-wide screen share policy changed.
    #[serde(rename_all = "camelCase")]
    ScreenShareGlobalUpdate { enabled: bool },
}
