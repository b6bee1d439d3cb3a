//! Mock media engine for Session Controller testing.
//!
//! Wraps the in-process engine and adds failure injection plus call
//! recording, so tests can verify teardown ordering and best-effort
//! semantics.
//!
//! # Example
//!
//! ```rust,ignore
//! use sc_test_utils::MockMediaEngine;
//!
//! let engine = MockMediaEngine::new();
//! engine.fail_producer_close(&producer_id);
//! // The close call errors, teardown must still continue...
//! ```

use async_trait::async_trait;
use session_controller::media::{
    ConsumerParams, LocalMediaEngine, MediaEngine, MediaError, TransportParams,
};
use session_controller::protocol::{MediaKind, TransportDirection};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Mock media engine with failure injection.
#[derive(Debug, Default)]
pub struct MockMediaEngine {
    inner: LocalMediaEngine,
    fail_router_create: AtomicBool,
    fail_producer_closes: Mutex<HashSet<String>>,
    fail_consumer_closes: Mutex<HashSet<String>>,
    closed_producers: Mutex<Vec<String>>,
    closed_consumers: Mutex<Vec<String>>,
    closed_transports: Mutex<Vec<String>>,
    closed_routers: Mutex<Vec<String>>,
}

impl MockMediaEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next (and all further) router creations fail.
    pub fn fail_router_create(&self) {
        self.fail_router_create.store(true, Ordering::SeqCst);
    }

    /// Make `close_producer` fail for the given producer id.
    pub fn fail_producer_close(&self, producer_id: &str) {
        self.fail_producer_closes
            .lock()
            .expect("mock lock poisoned")
            .insert(producer_id.to_string());
    }

    /// Make `close_consumer` fail for the given consumer id.
    pub fn fail_consumer_close(&self, consumer_id: &str) {
        self.fail_consumer_closes
            .lock()
            .expect("mock lock poisoned")
            .insert(consumer_id.to_string());
    }

    /// Producer ids whose close was attempted (successful or not).
    #[must_use]
    pub fn closed_producers(&self) -> Vec<String> {
        self.closed_producers
            .lock()
            .expect("mock lock poisoned")
            .clone()
    }

    /// Consumer ids whose close was attempted (successful or not).
    #[must_use]
    pub fn closed_consumers(&self) -> Vec<String> {
        self.closed_consumers
            .lock()
            .expect("mock lock poisoned")
            .clone()
    }

    /// Transport ids whose close was attempted (successful or not).
    #[must_use]
    pub fn closed_transports(&self) -> Vec<String> {
        self.closed_transports
            .lock()
            .expect("mock lock poisoned")
            .clone()
    }

    /// Router ids whose close was attempted (successful or not).
    #[must_use]
    pub fn closed_routers(&self) -> Vec<String> {
        self.closed_routers
            .lock()
            .expect("mock lock poisoned")
            .clone()
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn create_router(&self, room_id: &str) -> Result<String, MediaError> {
        if self.fail_router_create.load(Ordering::SeqCst) {
            return Err(MediaError::Engine("injected router failure".to_string()));
        }
        self.inner.create_router(room_id).await
    }

    async fn router_capabilities(&self, router_id: &str) -> Result<serde_json::Value, MediaError> {
        self.inner.router_capabilities(router_id).await
    }

    async fn close_router(&self, router_id: &str) -> Result<(), MediaError> {
        self.closed_routers
            .lock()
            .expect("mock lock poisoned")
            .push(router_id.to_string());
        self.inner.close_router(router_id).await
    }

    async fn create_transport(
        &self,
        router_id: &str,
        direction: TransportDirection,
    ) -> Result<TransportParams, MediaError> {
        self.inner.create_transport(router_id, direction).await
    }

    async fn connect_transport(
        &self,
        transport_id: &str,
        dtls_parameters: serde_json::Value,
    ) -> Result<(), MediaError> {
        self.inner.connect_transport(transport_id, dtls_parameters).await
    }

    async fn produce(
        &self,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) -> Result<String, MediaError> {
        self.inner.produce(transport_id, kind, rtp_parameters).await
    }

    async fn can_consume(
        &self,
        router_id: &str,
        producer_id: &str,
        capabilities: &serde_json::Value,
    ) -> Result<bool, MediaError> {
        self.inner.can_consume(router_id, producer_id, capabilities).await
    }

    async fn consume(
        &self,
        transport_id: &str,
        producer_id: &str,
        capabilities: serde_json::Value,
    ) -> Result<ConsumerParams, MediaError> {
        self.inner.consume(transport_id, producer_id, capabilities).await
    }

    async fn resume_consumer(&self, consumer_id: &str) -> Result<(), MediaError> {
        self.inner.resume_consumer(consumer_id).await
    }

    async fn close_producer(&self, producer_id: &str) -> Result<Vec<String>, MediaError> {
        self.closed_producers
            .lock()
            .expect("mock lock poisoned")
            .push(producer_id.to_string());
        if self
            .fail_producer_closes
            .lock()
            .expect("mock lock poisoned")
            .contains(producer_id)
        {
            return Err(MediaError::Engine("injected producer close failure".to_string()));
        }
        self.inner.close_producer(producer_id).await
    }

    async fn close_consumer(&self, consumer_id: &str) -> Result<(), MediaError> {
        self.closed_consumers
            .lock()
            .expect("mock lock poisoned")
            .push(consumer_id.to_string());
        if self
            .fail_consumer_closes
            .lock()
            .expect("mock lock poisoned")
            .contains(consumer_id)
        {
            return Err(MediaError::Engine("injected consumer close failure".to_string()));
        }
        self.inner.close_consumer(consumer_id).await
    }

    async fn close_transport(&self, transport_id: &str) -> Result<(), MediaError> {
        self.closed_transports
            .lock()
            .expect("mock lock poisoned")
            .push(transport_id.to_string());
        self.inner.close_transport(transport_id).await
    }
}
