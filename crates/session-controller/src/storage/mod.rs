//! Persistence collaborator interface.
//!
//! Rooms and participants are persisted outside the controller so
//! roles and lock flags survive reconnects. Privileged decisions always
//! re-read persisted state through this trait rather than trusting
//! in-memory caches.

pub mod memory;

pub use memory::MemoryStore;

use access_control::Role;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by the persistence collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

/// Persisted room record.
#[derive(Debug, Clone)]
pub struct RoomRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// External user id of the room's creator. The creator can never be
    /// removed from the room.
    pub creator_id: String,
}

/// Persisted participant record, keyed by (room_id, user_id).
#[derive(Debug, Clone)]
pub struct ParticipantRecord {
    pub room_id: String,
    pub user_id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub role: Role,
    pub is_audio_muted: bool,
    pub is_video_paused: bool,
    pub audio_locked: bool,
    pub screen_share_locked: bool,
}

impl ParticipantRecord {
    #[must_use]
    pub fn new(room_id: &str, user_id: &str, name: &str, image_url: Option<String>, role: Role) -> Self {
        Self {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            image_url,
            role,
            is_audio_muted: false,
            is_video_paused: false,
            audio_locked: false,
            screen_share_locked: false,
        }
    }
}

/// Partial update applied to a participant record. `None` fields are
/// left untouched.
#[derive(Debug, Clone, Default)]
pub struct ParticipantUpdate {
    pub role: Option<Role>,
    pub is_audio_muted: Option<bool>,
    pub is_video_paused: Option<bool>,
    pub audio_locked: Option<bool>,
    pub screen_share_locked: Option<bool>,
}

impl ParticipantUpdate {
    pub(crate) fn apply(&self, record: &mut ParticipantRecord) {
        if let Some(role) = self.role {
            record.role = role;
        }
        if let Some(muted) = self.is_audio_muted {
            record.is_audio_muted = muted;
        }
        if let Some(paused) = self.is_video_paused {
            record.is_video_paused = paused;
        }
        if let Some(locked) = self.audio_locked {
            record.audio_locked = locked;
        }
        if let Some(locked) = self.screen_share_locked {
            record.screen_share_locked = locked;
        }
    }
}

/// Durable store for room and participant records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create the room if absent; `creator_id` only applies on create.
    /// Returns the stored record either way.
    async fn upsert_room(&self, room_id: &str, creator_id: &str)
        -> Result<RoomRecord, StorageError>;

    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StorageError>;

    /// Create the participant with `record`'s contents, or refresh
    /// display metadata (name, image) on rejoin. Role and media state
    /// are preserved when the record already exists. Returns the stored
    /// record.
    async fn upsert_participant(
        &self,
        record: ParticipantRecord,
    ) -> Result<ParticipantRecord, StorageError>;

    async fn get_participant(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<ParticipantRecord>, StorageError>;

    /// Apply a partial update. Errors with `NotFound` when absent.
    async fn update_participant(
        &self,
        room_id: &str,
        user_id: &str,
        update: ParticipantUpdate,
    ) -> Result<ParticipantRecord, StorageError>;

    /// Apply a partial update to every participant with `role` in the
    /// room. Returns the user ids updated.
    async fn update_by_role(
        &self,
        room_id: &str,
        role: Role,
        update: ParticipantUpdate,
    ) -> Result<Vec<String>, StorageError>;

    async fn delete_participant(&self, room_id: &str, user_id: &str) -> Result<(), StorageError>;

    async fn list_participants(
        &self,
        room_id: &str,
    ) -> Result<Vec<ParticipantRecord>, StorageError>;
}
