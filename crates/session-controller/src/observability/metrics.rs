//! Controller metrics.
//!
//! Live gauges are kept in a shared atomic struct so the registry actor
//! can update them lock-free; the same values are mirrored into the
//! Prometheus exporter under the `sc_` prefix.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared gauges and counters for the actor system.
///
/// Updated by the registry and room actors, read by the Prometheus
/// mirror and by shutdown logging.
#[derive(Debug, Default)]
pub struct RegistryMetrics {
    /// Rooms currently live.
    active_rooms: AtomicUsize,
    /// Peers currently joined across all rooms.
    active_peers: AtomicUsize,
    /// Signaling requests processed since startup.
    requests_processed: AtomicU64,
    /// Privileged actions denied since startup.
    control_denials: AtomicU64,
}

impl RegistryMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn room_created(&self) {
        let rooms = self.active_rooms.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("sc_active_rooms").set(rooms as f64);
    }

    pub fn room_removed(&self) {
        let rooms = self.active_rooms.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        metrics::gauge!("sc_active_rooms").set(rooms as f64);
    }

    pub fn peer_joined(&self) {
        let peers = self.active_peers.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("sc_active_peers").set(peers as f64);
    }

    pub fn peer_left(&self) {
        let peers = self.active_peers.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        metrics::gauge!("sc_active_peers").set(peers as f64);
    }

    pub fn record_request(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sc_signaling_requests_total").increment(1);
    }

    /// Record a denied privileged action, labeled by reason code.
    pub fn record_control_denial(&self, reason: &'static str) {
        self.control_denials.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sc_control_denials_total", "reason" => reason).increment(1);
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.active_rooms.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.active_peers.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn requests_processed(&self) -> u64 {
        self.requests_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn control_denials(&self) -> u64 {
        self.control_denials.load(Ordering::Relaxed)
    }
}
