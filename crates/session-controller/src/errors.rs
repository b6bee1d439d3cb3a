//! Session Controller error types.
//!
//! Error types map to signaling `code` values for client responses.
//! Internal details (store/engine failures) are logged server-side and
//! never exposed to clients.

use access_control::DenyReason;
use thiserror::Error;

/// Session Controller error type.
///
/// Maps to signaling `code` values:
/// - `BadRequest`: `BAD_REQUEST` (1)
/// - `PermissionDenied` (including rate limiting): `FORBIDDEN` (3)
/// - not-found variants: `NOT_FOUND` (4)
/// - `Conflict`: `CONFLICT` (5)
/// - `Storage`, `Media`, `Config`, `Internal`: `INTERNAL_ERROR` (6)
/// - `IncompatibleMedia`: `INCOMPATIBLE` (7)
/// - `Draining`: `UNAVAILABLE` (8)
#[derive(Debug, Error)]
pub enum ScError {
    /// Persistence collaborator failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Media engine collaborator failed.
    #[error("Media engine error: {0}")]
    Media(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or out-of-order request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Room not found.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Peer not found in room.
    #[error("Peer not found")]
    PeerNotFound,

    /// Transport not found under the requesting peer.
    #[error("Transport not found")]
    TransportNotFound,

    /// Producer not found in the room.
    #[error("Producer not found")]
    ProducerNotFound,

    /// Consumer not found under the requesting peer.
    #[error("Consumer not found")]
    ConsumerNotFound,

    /// Denied by the access control engine; carries the stable reason code.
    #[error("Permission denied: {0}")]
    PermissionDenied(DenyReason),

    /// Media capabilities incompatible with the requested producer.
    #[error("Incompatible media capabilities")]
    IncompatibleMedia,

    /// Conflict (e.g. join while already joined to another room).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Controller is draining (graceful shutdown).
    #[error("Controller is draining")]
    Draining,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScError {
    /// Returns the signaling `code` value for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            ScError::BadRequest(_) => 1,
            ScError::PermissionDenied(_) => 3,
            ScError::RoomNotFound(_)
            | ScError::PeerNotFound
            | ScError::TransportNotFound
            | ScError::ProducerNotFound
            | ScError::ConsumerNotFound => 4,
            ScError::Conflict(_) => 5,
            ScError::Storage(_) | ScError::Media(_) | ScError::Config(_) | ScError::Internal(_) => {
                6
            }
            ScError::IncompatibleMedia => 7,
            ScError::Draining => 8,
        }
    }

    /// Stable machine-readable reason code, when one exists.
    #[must_use]
    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            ScError::PermissionDenied(reason) => Some(reason.as_str()),
            _ => None,
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            ScError::Storage(_)
            | ScError::Media(_)
            | ScError::Config(_)
            | ScError::Internal(_) => "An internal error occurred".to_string(),
            ScError::BadRequest(msg) => msg.clone(),
            ScError::RoomNotFound(_) => "Room not found".to_string(),
            ScError::PeerNotFound => "Peer not found".to_string(),
            ScError::TransportNotFound => "Transport not found".to_string(),
            ScError::ProducerNotFound => "Producer not found".to_string(),
            ScError::ConsumerNotFound => "Consumer not found".to_string(),
            ScError::PermissionDenied(reason) => reason.message().to_string(),
            ScError::IncompatibleMedia => "Media capabilities are not compatible".to_string(),
            ScError::Conflict(msg) => msg.clone(),
            ScError::Draining => "Server is shutting down, please reconnect".to_string(),
        }
    }
}
