//! In-process media engine.
//!
//! Bookkeeping-only implementation of [`MediaEngine`]: it fabricates
//! ICE/DTLS parameters and tracks router/transport/producer/consumer
//! ownership so cascade semantics hold, without moving any packets.
//! Suitable for development and as the reference for engine adapters.

use super::{ConsumerParams, MediaEngine, MediaError, TransportParams};
use crate::protocol::{MediaKind, TransportDirection};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct TransportEntry {
    router_id: String,
    connected: bool,
}

#[derive(Debug, Clone)]
struct ProducerEntry {
    transport_id: String,
    kind: MediaKind,
}

#[derive(Debug, Clone)]
struct ConsumerEntry {
    transport_id: String,
    producer_id: String,
    paused: bool,
}

#[derive(Debug, Default)]
struct State {
    routers: HashMap<String, String>,
    transports: HashMap<String, TransportEntry>,
    producers: HashMap<String, ProducerEntry>,
    consumers: HashMap<String, ConsumerEntry>,
}

/// Bookkeeping-only [`MediaEngine`].
#[derive(Debug, Default)]
pub struct LocalMediaEngine {
    state: Mutex<State>,
}

impl LocalMediaEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, MediaError> {
        self.state
            .lock()
            .map_err(|_| MediaError::Engine("media engine state poisoned".to_string()))
    }

    fn supported_capabilities() -> serde_json::Value {
        serde_json::json!({
            "codecs": [
                {
                    "kind": "audio",
                    "mimeType": "audio/opus",
                    "clockRate": 48000,
                    "channels": 2,
                },
                {
                    "kind": "video",
                    "mimeType": "video/VP8",
                    "clockRate": 90000,
                },
            ],
        })
    }
}

#[async_trait]
impl MediaEngine for LocalMediaEngine {
    async fn create_router(&self, room_id: &str) -> Result<String, MediaError> {
        let router_id = format!("router-{}", Uuid::new_v4());
        let mut state = self.lock()?;
        state.routers.insert(router_id.clone(), room_id.to_string());
        debug!(target: "sc.media", router_id = %router_id, room_id = %room_id, "Router created");
        Ok(router_id)
    }

    async fn router_capabilities(&self, router_id: &str) -> Result<serde_json::Value, MediaError> {
        let state = self.lock()?;
        if !state.routers.contains_key(router_id) {
            return Err(MediaError::RouterNotFound(router_id.to_string()));
        }
        Ok(Self::supported_capabilities())
    }

    async fn close_router(&self, router_id: &str) -> Result<(), MediaError> {
        let mut state = self.lock()?;
        if state.routers.remove(router_id).is_none() {
            return Err(MediaError::RouterNotFound(router_id.to_string()));
        }

        let transport_ids: Vec<String> = state
            .transports
            .iter()
            .filter(|(_, t)| t.router_id == router_id)
            .map(|(id, _)| id.clone())
            .collect();
        for transport_id in &transport_ids {
            state.transports.remove(transport_id);
            state.producers.retain(|_, p| &p.transport_id != transport_id);
            state.consumers.retain(|_, c| &c.transport_id != transport_id);
        }
        debug!(target: "sc.media", router_id = %router_id, "Router closed");
        Ok(())
    }

    async fn create_transport(
        &self,
        router_id: &str,
        direction: TransportDirection,
    ) -> Result<TransportParams, MediaError> {
        let mut state = self.lock()?;
        if !state.routers.contains_key(router_id) {
            return Err(MediaError::RouterNotFound(router_id.to_string()));
        }

        let transport_id = format!("transport-{}", Uuid::new_v4());
        state.transports.insert(
            transport_id.clone(),
            TransportEntry {
                router_id: router_id.to_string(),
                connected: false,
            },
        );
        debug!(
            target: "sc.media",
            transport_id = %transport_id,
            ?direction,
            "Transport created"
        );

        Ok(TransportParams {
            transport_id,
            ice_parameters: serde_json::json!({
                "usernameFragment": Uuid::new_v4().to_string(),
                "password": Uuid::new_v4().to_string(),
                "iceLite": true,
            }),
            ice_candidates: serde_json::json!([]),
            dtls_parameters: serde_json::json!({
                "role": "auto",
                "fingerprints": [
                    { "algorithm": "sha-256", "value": Uuid::new_v4().to_string() },
                ],
            }),
        })
    }

    async fn connect_transport(
        &self,
        transport_id: &str,
        _dtls_parameters: serde_json::Value,
    ) -> Result<(), MediaError> {
        let mut state = self.lock()?;
        let transport = state
            .transports
            .get_mut(transport_id)
            .ok_or_else(|| MediaError::TransportNotFound(transport_id.to_string()))?;
        transport.connected = true;
        Ok(())
    }

    async fn produce(
        &self,
        transport_id: &str,
        kind: MediaKind,
        _rtp_parameters: serde_json::Value,
    ) -> Result<String, MediaError> {
        let mut state = self.lock()?;
        if !state.transports.contains_key(transport_id) {
            return Err(MediaError::TransportNotFound(transport_id.to_string()));
        }

        let producer_id = format!("producer-{}", Uuid::new_v4());
        state.producers.insert(
            producer_id.clone(),
            ProducerEntry {
                transport_id: transport_id.to_string(),
                kind,
            },
        );
        debug!(target: "sc.media", producer_id = %producer_id, kind = kind.as_str(), "Producer created");
        Ok(producer_id)
    }

    async fn can_consume(
        &self,
        router_id: &str,
        producer_id: &str,
        capabilities: &serde_json::Value,
    ) -> Result<bool, MediaError> {
        let state = self.lock()?;
        if !state.routers.contains_key(router_id) {
            return Err(MediaError::RouterNotFound(router_id.to_string()));
        }
        if !state.producers.contains_key(producer_id) {
            return Err(MediaError::ProducerNotFound(producer_id.to_string()));
        }
        // Without real codec negotiation, any capability set that lists
        // at least one codec is considered compatible.
        let has_codecs = capabilities
            .get("codecs")
            .and_then(|c| c.as_array())
            .is_some_and(|codecs| !codecs.is_empty());
        Ok(has_codecs)
    }

    async fn consume(
        &self,
        transport_id: &str,
        producer_id: &str,
        capabilities: serde_json::Value,
    ) -> Result<ConsumerParams, MediaError> {
        let mut state = self.lock()?;
        if !state.transports.contains_key(transport_id) {
            return Err(MediaError::TransportNotFound(transport_id.to_string()));
        }
        let kind = state
            .producers
            .get(producer_id)
            .map(|p| p.kind)
            .ok_or_else(|| MediaError::ProducerNotFound(producer_id.to_string()))?;

        let has_codecs = capabilities
            .get("codecs")
            .and_then(|c| c.as_array())
            .is_some_and(|codecs| !codecs.is_empty());
        if !has_codecs {
            return Err(MediaError::Incompatible(producer_id.to_string()));
        }

        let consumer_id = format!("consumer-{}", Uuid::new_v4());
        state.consumers.insert(
            consumer_id.clone(),
            ConsumerEntry {
                transport_id: transport_id.to_string(),
                producer_id: producer_id.to_string(),
                paused: true,
            },
        );
        debug!(target: "sc.media", consumer_id = %consumer_id, producer_id = %producer_id, "Consumer created paused");

        Ok(ConsumerParams {
            consumer_id,
            producer_id: producer_id.to_string(),
            kind,
            rtp_parameters: serde_json::json!({}),
        })
    }

    async fn resume_consumer(&self, consumer_id: &str) -> Result<(), MediaError> {
        let mut state = self.lock()?;
        let consumer = state
            .consumers
            .get_mut(consumer_id)
            .ok_or_else(|| MediaError::ConsumerNotFound(consumer_id.to_string()))?;
        consumer.paused = false;
        Ok(())
    }

    async fn close_producer(&self, producer_id: &str) -> Result<Vec<String>, MediaError> {
        let mut state = self.lock()?;
        if state.producers.remove(producer_id).is_none() {
            return Err(MediaError::ProducerNotFound(producer_id.to_string()));
        }

        // Cascade: consumers bound to this producer close with it.
        let cascaded: Vec<String> = state
            .consumers
            .iter()
            .filter(|(_, c)| c.producer_id == producer_id)
            .map(|(id, _)| id.clone())
            .collect();
        for consumer_id in &cascaded {
            state.consumers.remove(consumer_id);
        }
        debug!(
            target: "sc.media",
            producer_id = %producer_id,
            cascaded = cascaded.len(),
            "Producer closed"
        );
        Ok(cascaded)
    }

    async fn close_consumer(&self, consumer_id: &str) -> Result<(), MediaError> {
        let mut state = self.lock()?;
        if state.consumers.remove(consumer_id).is_none() {
            return Err(MediaError::ConsumerNotFound(consumer_id.to_string()));
        }
        Ok(())
    }

    async fn close_transport(&self, transport_id: &str) -> Result<(), MediaError> {
        let mut state = self.lock()?;
        if state.transports.remove(transport_id).is_none() {
            return Err(MediaError::TransportNotFound(transport_id.to_string()));
        }
        state.producers.retain(|_, p| p.transport_id != transport_id);
        state.consumers.retain(|_, c| c.transport_id != transport_id);
        Ok(())
    }
}
