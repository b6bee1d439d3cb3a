//! Session Controller
//!
//! Stateful WebSocket signaling server for multi-party media sessions.
//!
//! # Servers
//!
//! One HTTP server carries everything:
//! - `GET /ws` - WebSocket signaling endpoint
//! - `GET /health`, `GET /ready` - Kubernetes probes
//! - `GET /metrics` - Prometheus exporter
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Initialize the media engine and session store collaborators
//! 4. Initialize the actor system (`RoomRegistryActorHandle`)
//! 5. Start the HTTP server (signaling + health + metrics)
//! 6. Wait for shutdown signal, then drain

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use access_control::RateLimitConfig;
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use session_controller::actors::RoomRegistryActorHandle;
use session_controller::config::Config;
use session_controller::gateway::{signaling_router, GatewayState};
use session_controller::media::LocalMediaEngine;
use session_controller::observability::{health_router, RegistryMetrics};
use session_controller::storage::MemoryStore;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Session Controller");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        sc_id = %config.sc_id,
        bind_address = %config.bind_address,
        max_rooms = config.max_rooms,
        max_peers_per_room = config.max_peers_per_room,
        rate_limit_window_secs = config.rate_limit_window.as_secs(),
        rate_limit_max_actions = config.rate_limit_max_actions,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder.
    // This must happen before any metrics are recorded.
    let prometheus_handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        format!("Failed to install Prometheus metrics recorder: {e}")
    })?;
    info!("Prometheus metrics recorder initialized");

    // Collaborators: in-process media engine and in-memory store.
    let media = Arc::new(LocalMediaEngine::new());
    let store = Arc::new(MemoryStore::new());

    // Initialize actor system
    info!("Initializing actor system...");
    let registry_metrics = RegistryMetrics::new();
    let registry = RoomRegistryActorHandle::new(
        config.sc_id.clone(),
        media,
        store,
        RateLimitConfig {
            window: config.rate_limit_window,
            max_actions: config.rate_limit_max_actions,
        },
        config.audit_log_capacity,
        config.max_rooms as usize,
        config.max_peers_per_room as usize,
        Arc::clone(&registry_metrics),
    );
    info!("Actor system initialized");

    // Build the combined router: signaling + health + metrics.
    let bind_addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        format!("Invalid bind address: {e}")
    })?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    // Readiness is answered by the registry itself.
    let app = signaling_router(GatewayState {
        registry: registry.clone(),
    })
    .merge(health_router(registry.clone()))
    .merge(metrics_router)
    .layer(TraceLayer::new_for_http());

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(bind_addr).await.map_err(|e| {
        error!(error = %e, addr = %bind_addr, "Failed to bind server");
        format!("Failed to bind server to {bind_addr}: {e}")
    })?;
    info!(addr = %bind_addr, "Server bound successfully");

    let server_shutdown_token = registry.child_token();
    let server = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            server_shutdown_token.cancelled().await;
            info!("Server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Server failed");
        }
    });
    info!(addr = %bind_addr, "Server started");

    // Wait for shutdown signal
    info!("Session Controller running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Flips the registry to draining; /ready turns 503 so k8s stops
    // sending traffic.
    if let Err(e) = registry.shutdown().await {
        warn!(error = %e, "Actor system shutdown error");
    }

    // Give rooms time to drain before the process exits
    tokio::time::sleep(Duration::from_secs(2)).await;
    server.abort();

    info!("Session Controller shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
