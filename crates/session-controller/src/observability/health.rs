//! Health endpoints for the Session Controller.
//!
//! Kubernetes probes:
//! - `GET /health` - liveness (the process answers HTTP)
//! - `GET /ready` - readiness, answered by the room registry: 200 while
//!   it accepts new rooms, 503 once it is draining or gone
//!
//! Note: The `/metrics` endpoint is served separately via `metrics-exporter-prometheus`.

use crate::actors::RoomRegistryActorHandle;
use axum::{extract::State, http::StatusCode, routing::get, Router};

/// Create the health router with liveness and readiness endpoints.
///
/// Readiness is not a stored flag: each probe round-trips through the
/// registry mailbox, so a wedged or draining actor system stops
/// receiving traffic without any extra bookkeeping.
pub fn health_router(registry: RoomRegistryActorHandle) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(registry)
}

/// Liveness probe handler.
async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe handler.
///
/// Returns 200 only when the registry answers and is still accepting
/// new rooms. A registry that is shut down either reports
/// `accepting_new = false` or fails the mailbox round-trip; both map
/// to 503.
async fn readiness_handler(State(registry): State<RoomRegistryActorHandle>) -> StatusCode {
    match registry.get_status().await {
        Ok(status) if status.accepting_new => StatusCode::OK,
        Ok(_) | Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::media::LocalMediaEngine;
    use crate::observability::RegistryMetrics;
    use crate::storage::MemoryStore;
    use access_control::RateLimitConfig;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn test_registry() -> RoomRegistryActorHandle {
        RoomRegistryActorHandle::new(
            "sc-test".to_string(),
            Arc::new(LocalMediaEngine::new()),
            Arc::new(MemoryStore::new()),
            RateLimitConfig::default(),
            100,
            10,
            100,
            RegistryMetrics::new(),
        )
    }

    async fn probe(registry: &RoomRegistryActorHandle, path: &str) -> StatusCode {
        let app = health_router(registry.clone());
        let request = Request::builder()
            .uri(path)
            .body(Body::empty())
            .expect("Failed to build request");
        app.oneshot(request)
            .await
            .expect("Failed to execute request")
            .status()
    }

    #[tokio::test]
    async fn test_liveness_is_always_ok() {
        let registry = test_registry();
        assert_eq!(probe(&registry, "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_follows_registry_lifecycle() {
        let registry = test_registry();
        assert_eq!(
            probe(&registry, "/ready").await,
            StatusCode::OK,
            "/ready should return 200 while the registry accepts rooms"
        );

        registry.shutdown().await.unwrap();
        assert_eq!(
            probe(&registry, "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE,
            "/ready should return 503 once the registry is draining"
        );
    }

    #[tokio::test]
    async fn test_health_router_unknown_path_returns_404() {
        let registry = test_registry();
        assert_eq!(
            probe(&registry, "/unknown").await,
            StatusCode::NOT_FOUND
        );
    }
}
