//! Media engine collaborator interface.
//!
//! The controller never touches RTP itself. Everything media-level goes
//! through [`MediaEngine`]: router (per-room routing context) creation,
//! transport parameter generation, producer/consumer lifecycle. The
//! trait is object-safe so the gateway can hold an `Arc<dyn MediaEngine>`
//! and tests can substitute a mock.

pub mod local;

pub use local::LocalMediaEngine;

use crate::protocol::{MediaKind, TransportDirection};
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the media engine collaborator.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Router not found: {0}")]
    RouterNotFound(String),

    #[error("Transport not found: {0}")]
    TransportNotFound(String),

    #[error("Producer not found: {0}")]
    ProducerNotFound(String),

    #[error("Consumer not found: {0}")]
    ConsumerNotFound(String),

    #[error("Capabilities incompatible with producer {0}")]
    Incompatible(String),

    #[error("Media engine failure: {0}")]
    Engine(String),
}

/// ICE/DTLS material a client needs to establish a transport.
#[derive(Debug, Clone)]
pub struct TransportParams {
    pub transport_id: String,
    pub ice_parameters: serde_json::Value,
    pub ice_candidates: serde_json::Value,
    pub dtls_parameters: serde_json::Value,
}

/// A newly created consumer and the parameters the client renders with.
#[derive(Debug, Clone)]
pub struct ConsumerParams {
    pub consumer_id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: serde_json::Value,
}

/// Narrow interface to the media-forwarding engine.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Allocate a routing context for a room. Returns the router id.
    async fn create_router(&self, room_id: &str) -> Result<String, MediaError>;

    /// The router's RTP capabilities, sent to clients for negotiation.
    async fn router_capabilities(&self, router_id: &str) -> Result<serde_json::Value, MediaError>;

    /// Release a routing context and everything under it.
    async fn close_router(&self, router_id: &str) -> Result<(), MediaError>;

    /// Create a transport on a router and generate its ICE/DTLS material.
    async fn create_transport(
        &self,
        router_id: &str,
        direction: TransportDirection,
    ) -> Result<TransportParams, MediaError>;

    /// Complete the DTLS handshake for a transport.
    async fn connect_transport(
        &self,
        transport_id: &str,
        dtls_parameters: serde_json::Value,
    ) -> Result<(), MediaError>;

    /// Create a producer on a transport. Returns the producer id.
    async fn produce(
        &self,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) -> Result<String, MediaError>;

    /// Whether `capabilities` can consume the given producer.
    async fn can_consume(
        &self,
        router_id: &str,
        producer_id: &str,
        capabilities: &serde_json::Value,
    ) -> Result<bool, MediaError>;

    /// Create a consumer bound to a remote producer. Consumers start
    /// paused; [`MediaEngine::resume_consumer`] unpauses.
    async fn consume(
        &self,
        transport_id: &str,
        producer_id: &str,
        capabilities: serde_json::Value,
    ) -> Result<ConsumerParams, MediaError>;

    async fn resume_consumer(&self, consumer_id: &str) -> Result<(), MediaError>;

    /// Close a producer. Returns the ids of consumers the engine
    /// cascade-closed with it.
    async fn close_producer(&self, producer_id: &str) -> Result<Vec<String>, MediaError>;

    async fn close_consumer(&self, consumer_id: &str) -> Result<(), MediaError>;

    async fn close_transport(&self, transport_id: &str) -> Result<(), MediaError>;
}
