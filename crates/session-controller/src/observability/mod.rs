//! Observability: health endpoints and controller metrics.

pub mod health;
pub mod metrics;

pub use health::health_router;
pub use metrics::RegistryMetrics;
