//! Mock session store for Session Controller testing.
//!
//! Wraps the in-memory store and adds failure injection so tests can
//! verify that teardown makes forward progress when persistence fails.

use async_trait::async_trait;
use access_control::Role;
use session_controller::storage::{
    MemoryStore, ParticipantRecord, ParticipantUpdate, RoomRecord, SessionStore, StorageError,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Mock session store with failure injection.
#[derive(Debug, Default)]
pub struct MockSessionStore {
    inner: MemoryStore,
    fail_deletes: AtomicBool,
    fail_updates: AtomicBool,
    delete_attempts: AtomicU64,
}

impl MockSessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `delete_participant` call fail.
    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    /// Make every participant update call fail.
    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    /// Number of `delete_participant` calls attempted.
    #[must_use]
    pub fn delete_attempts(&self) -> u64 {
        self.delete_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for MockSessionStore {
    async fn upsert_room(
        &self,
        room_id: &str,
        creator_id: &str,
    ) -> Result<RoomRecord, StorageError> {
        self.inner.upsert_room(room_id, creator_id).await
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StorageError> {
        self.inner.get_room(room_id).await
    }

    async fn upsert_participant(
        &self,
        record: ParticipantRecord,
    ) -> Result<ParticipantRecord, StorageError> {
        self.inner.upsert_participant(record).await
    }

    async fn get_participant(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<ParticipantRecord>, StorageError> {
        self.inner.get_participant(room_id, user_id).await
    }

    async fn update_participant(
        &self,
        room_id: &str,
        user_id: &str,
        update: ParticipantUpdate,
    ) -> Result<ParticipantRecord, StorageError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected update failure".to_string()));
        }
        self.inner.update_participant(room_id, user_id, update).await
    }

    async fn update_by_role(
        &self,
        room_id: &str,
        role: Role,
        update: ParticipantUpdate,
    ) -> Result<Vec<String>, StorageError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected update failure".to_string()));
        }
        self.inner.update_by_role(room_id, role, update).await
    }

    async fn delete_participant(&self, room_id: &str, user_id: &str) -> Result<(), StorageError> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected delete failure".to_string()));
        }
        self.inner.delete_participant(room_id, user_id).await
    }

    async fn list_participants(
        &self,
        room_id: &str,
    ) -> Result<Vec<ParticipantRecord>, StorageError> {
        self.inner.list_participants(room_id).await
    }
}
