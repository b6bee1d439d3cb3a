//! Actor system for the Session Controller.
//!
//! Hierarchy:
//!
//! ```text
//! RoomRegistryActor (singleton)
//! ├── RoomActor (one per room)
//! │   ├── ConnectionActor (one per joined connection)
//! │   └── ...
//! └── ...
//! ```
//!
//! Cancellation tokens propagate down the hierarchy: cancelling the
//! registry drains every room, cancelling a room drops its connections.

pub mod connection;
pub mod messages;
pub mod registry;
pub mod room;

pub use connection::{ConnectionActor, ConnectionActorHandle};
pub use messages::{
    ConnectionMessage, ConsumeOutcome, JoinOutcome, RegistryMessage, RegistryStatus, RoomMessage,
    RoomState,
};
pub use registry::{RoomRegistryActor, RoomRegistryActorHandle};
pub use room::{RoomActor, RoomActorHandle};
