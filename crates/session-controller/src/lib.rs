//! Session Controller Service Library
//!
//! Core functionality for the Session Controller - a stateful WebSocket
//! signaling server responsible for:
//!
//! - Room, peer, transport, producer and consumer lifecycle
//! - The signaling protocol driving media negotiation with clients
//! - Role-based access control over privileged moderation actions,
//!   with per-actor rate limiting and an append-only audit trail
//! - Cascading resource teardown on disconnect
//!
//! # Architecture
//!
//! The controller uses an actor model hierarchy:
//!
//! ```text
//! RoomRegistryActor (singleton per controller instance)
//! ├── supervises N RoomActors
//! │   └── RoomActor (one per active room)
//! │       ├── owns the room's peer/transport/producer/consumer maps
//! │       ├── owns its routing context at the media engine
//! │       └── supervises N ConnectionActors
//! │           └── ConnectionActor (one per WebSocket connection)
//! └── ...
//! ```
//!
//! # Key Design Decisions
//!
//! - **One actor per room**: all room mutation flows through one
//!   mailbox, so shared maps are never touched concurrently
//! - **Persisted roles are authoritative**: privileged decisions always
//!   re-read the store; cached flags only speed up non-policy paths
//! - **Best-effort teardown**: an individual close failure never blocks
//!   the rest of a peer's cleanup
//!
//! # Modules
//!
//! - [`actors`] - Actor model implementation
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with signaling error codes
//! - [`gateway`] - WebSocket protocol handler
//! - [`media`] - Media engine collaborator interface
//! - [`observability`] - Health endpoints and metrics
//! - [`protocol`] - Wire-format message types
//! - [`storage`] - Persistence collaborator interface

pub mod actors;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod media;
pub mod observability;
pub mod protocol;
pub mod storage;
