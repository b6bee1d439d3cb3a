//! In-memory session store.
//!
//! Default [`SessionStore`] backend: tokio `RwLock`-guarded maps.
//! Records do not survive a process restart, which matches single-node
//! deployments where rooms are ephemeral anyway.

use super::{ParticipantRecord, ParticipantUpdate, RoomRecord, SessionStore, StorageError};
use access_control::Role;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Composite participant key.
type ParticipantKey = (String, String);

/// In-memory [`SessionStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    rooms: RwLock<HashMap<String, RoomRecord>>,
    participants: RwLock<HashMap<ParticipantKey, ParticipantRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn upsert_room(
        &self,
        room_id: &str,
        creator_id: &str,
    ) -> Result<RoomRecord, StorageError> {
        let mut rooms = self.rooms.write().await;
        let record = rooms.entry(room_id.to_string()).or_insert_with(|| RoomRecord {
            id: room_id.to_string(),
            created_at: Utc::now(),
            creator_id: creator_id.to_string(),
        });
        Ok(record.clone())
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StorageError> {
        Ok(self.rooms.read().await.get(room_id).cloned())
    }

    async fn upsert_participant(
        &self,
        record: ParticipantRecord,
    ) -> Result<ParticipantRecord, StorageError> {
        let key = (record.room_id.clone(), record.user_id.clone());
        let mut participants = self.participants.write().await;
        match participants.get_mut(&key) {
            Some(existing) => {
                // Rejoin: refresh display metadata only.
                existing.name = record.name;
                existing.image_url = record.image_url;
                Ok(existing.clone())
            }
            None => {
                participants.insert(key, record.clone());
                Ok(record)
            }
        }
    }

    async fn get_participant(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<ParticipantRecord>, StorageError> {
        let key = (room_id.to_string(), user_id.to_string());
        Ok(self.participants.read().await.get(&key).cloned())
    }

    async fn update_participant(
        &self,
        room_id: &str,
        user_id: &str,
        update: ParticipantUpdate,
    ) -> Result<ParticipantRecord, StorageError> {
        let key = (room_id.to_string(), user_id.to_string());
        let mut participants = self.participants.write().await;
        let record = participants
            .get_mut(&key)
            .ok_or_else(|| StorageError::NotFound(format!("participant {room_id}/{user_id}")))?;
        update.apply(record);
        Ok(record.clone())
    }

    async fn update_by_role(
        &self,
        room_id: &str,
        role: Role,
        update: ParticipantUpdate,
    ) -> Result<Vec<String>, StorageError> {
        let mut participants = self.participants.write().await;
        let mut updated = Vec::new();
        for ((record_room, user_id), record) in participants.iter_mut() {
            if record_room == room_id && record.role == role {
                update.apply(record);
                updated.push(user_id.clone());
            }
        }
        Ok(updated)
    }

    async fn delete_participant(&self, room_id: &str, user_id: &str) -> Result<(), StorageError> {
        let key = (room_id.to_string(), user_id.to_string());
        self.participants.write().await.remove(&key);
        Ok(())
    }

    async fn list_participants(
        &self,
        room_id: &str,
    ) -> Result<Vec<ParticipantRecord>, StorageError> {
        let participants = self.participants.read().await;
        let mut records: Vec<ParticipantRecord> = participants
            .values()
            .filter(|record| record.room_id == room_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(records)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_room_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.upsert_room("room-1", "alice").await.unwrap();
        let second = store.upsert_room("room-1", "bob").await.unwrap();

        assert_eq!(first.creator_id, "alice");
        // Creator never changes once the room exists.
        assert_eq!(second.creator_id, "alice");
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn test_upsert_participant_preserves_role_and_state() {
        let store = MemoryStore::new();
        store
            .upsert_participant(ParticipantRecord::new(
                "room-1",
                "alice",
                "Alice",
                None,
                Role::Host,
            ))
            .await
            .unwrap();
        store
            .update_participant(
                "room-1",
                "alice",
                ParticipantUpdate {
                    is_audio_muted: Some(true),
                    audio_locked: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Rejoin with a new display name and a downgraded role.
        let rejoined = store
            .upsert_participant(ParticipantRecord::new(
                "room-1",
                "alice",
                "Alice B",
                Some("https://example.com/a.png".to_string()),
                Role::Participant,
            ))
            .await
            .unwrap();

        assert_eq!(rejoined.name, "Alice B");
        assert_eq!(rejoined.role, Role::Host);
        assert!(rejoined.is_audio_muted);
        assert!(rejoined.audio_locked);
    }

    #[tokio::test]
    async fn test_update_by_role_scopes_to_role_and_room() {
        let store = MemoryStore::new();
        for (user, role) in [
            ("host", Role::Host),
            ("cohost", Role::CoHost),
            ("p1", Role::Participant),
            ("p2", Role::Participant),
        ] {
            store
                .upsert_participant(ParticipantRecord::new("room-1", user, user, None, role))
                .await
                .unwrap();
        }
        store
            .upsert_participant(ParticipantRecord::new(
                "room-2",
                "p3",
                "p3",
                None,
                Role::Participant,
            ))
            .await
            .unwrap();

        let updated = store
            .update_by_role(
                "room-1",
                Role::Participant,
                ParticipantUpdate {
                    is_audio_muted: Some(true),
                    audio_locked: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut updated_sorted = updated;
        updated_sorted.sort();
        assert_eq!(updated_sorted, vec!["p1", "p2"]);

        let host = store.get_participant("room-1", "host").await.unwrap().unwrap();
        assert!(!host.is_audio_muted);
        let other_room = store.get_participant("room-2", "p3").await.unwrap().unwrap();
        assert!(!other_room.is_audio_muted);
    }

    #[tokio::test]
    async fn test_update_missing_participant_errors() {
        let store = MemoryStore::new();
        let result = store
            .update_participant("room-1", "ghost", ParticipantUpdate::default())
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let store = MemoryStore::new();
        for user in ["b", "a", "c"] {
            store
                .upsert_participant(ParticipantRecord::new(
                    "room-1",
                    user,
                    user,
                    None,
                    Role::Participant,
                ))
                .await
                .unwrap();
        }

        store.delete_participant("room-1", "b").await.unwrap();
        // Deleting a missing record is not an error.
        store.delete_participant("room-1", "b").await.unwrap();

        let listed = store.list_participants("room-1").await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
