//! Privileged control pipeline integration tests.
//!
//! Runs real registry/room actors against the in-memory store and
//! verifies the full pipeline: rate limit, role-based permission check,
//! persisted-state update, targeted notification, and audit trail.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use access_control::{AuditResult, ControlAction, DenyReason, RateLimitConfig};
use sc_test_utils::{MockMediaEngine, MockSessionStore};
use session_controller::actors::{ConnectionActor, RoomActorHandle, RoomRegistryActorHandle};
use session_controller::errors::ScError;
use session_controller::media::MediaEngine;
use session_controller::observability::RegistryMetrics;
use session_controller::protocol::{MediaKind, TransportDirection};
use session_controller::storage::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Harness {
    registry: RoomRegistryActorHandle,
    store: Arc<MockSessionStore>,
}

fn harness(rate_config: RateLimitConfig) -> Harness {
    let media = Arc::new(MockMediaEngine::new());
    let store = Arc::new(MockSessionStore::new());
    let registry = RoomRegistryActorHandle::new(
        "sc-test".to_string(),
        media as Arc<dyn MediaEngine>,
        Arc::clone(&store) as Arc<dyn SessionStore>,
        rate_config,
        100,
        10,
        100,
        RegistryMetrics::new(),
    );
    Harness { registry, store }
}

fn generous_limits() -> RateLimitConfig {
    RateLimitConfig {
        window: Duration::from_secs(60),
        max_actions: 1000,
    }
}

async fn join(
    room: &RoomActorHandle,
    connection_id: &str,
    user_id: &str,
) -> Result<mpsc::Receiver<String>, ScError> {
    let (outbound_tx, outbound_rx) = mpsc::channel(100);
    let (events, _task) =
        ConnectionActor::spawn(connection_id.to_string(), room.child_token(), outbound_tx);
    room.join(
        connection_id.to_string(),
        user_id.to_string(),
        user_id.to_string(),
        None,
        events,
    )
    .await?;
    Ok(outbound_rx)
}

async fn recv_event(rx: &mut mpsc::Receiver<String>, needle: &str) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if frame.contains(needle) {
            return frame;
        }
    }
}

async fn produce_audio(room: &RoomActorHandle, connection_id: &str) -> Result<String, ScError> {
    let transport = room
        .create_transport(connection_id.to_string(), TransportDirection::Send)
        .await?;
    room.produce(
        connection_id.to_string(),
        transport.transport_id,
        MediaKind::Audio,
        serde_json::json!({}),
        false,
    )
    .await
}

#[tokio::test]
async fn test_rate_limit_denies_after_budget_exhausted() -> Result<(), anyhow::Error> {
    let h = harness(RateLimitConfig {
        window: Duration::from_secs(60),
        max_actions: 3,
    });
    let room = h.registry.get_or_create_room("room-1".to_string()).await?;

    let _alice_rx = join(&room, "conn-a", "alice").await?;
    let _bob_rx = join(&room, "conn-b", "bob").await?;

    for _ in 0..3 {
        room.control(
            "conn-a".to_string(),
            ControlAction::MuteParticipant,
            Some("bob".to_string()),
        )
        .await?;
    }

    // Fourth action within the window is denied regardless of the
    // actor's privileges.
    let result = room
        .control(
            "conn-a".to_string(),
            ControlAction::MuteParticipant,
            Some("bob".to_string()),
        )
        .await;
    assert!(matches!(
        result,
        Err(ScError::PermissionDenied(DenyReason::RateLimitExceeded))
    ));

    let audit = room.get_audit().await?;
    let denial = audit
        .iter()
        .find(|e| e.result == AuditResult::Denied)
        .expect("rate limit denial must be audited");
    assert_eq!(denial.reason, Some(DenyReason::RateLimitExceeded));
    assert_eq!(denial.actor_id, "alice");
    Ok(())
}

#[tokio::test]
async fn test_cohost_cannot_kick_host_but_can_kick_participant() -> Result<(), anyhow::Error> {
    let h = harness(generous_limits());
    let room = h.registry.get_or_create_room("room-1".to_string()).await?;

    let _alice_rx = join(&room, "conn-a", "alice").await?;
    let _bob_rx = join(&room, "conn-b", "bob").await?;
    let mut carol_rx = join(&room, "conn-c", "carol").await?;

    room.control(
        "conn-a".to_string(),
        ControlAction::PromoteCoHost,
        Some("bob".to_string()),
    )
    .await?;

    // Co-host Bob may not remove the host.
    let result = room
        .control(
            "conn-b".to_string(),
            ControlAction::RemoveParticipant,
            Some("alice".to_string()),
        )
        .await;
    assert!(matches!(
        result,
        Err(ScError::PermissionDenied(DenyReason::CohostCannotKickHost))
    ));
    let state = room.get_state().await?;
    assert_eq!(state.peer_count, 3);

    // But removing a plain participant is within co-host powers.
    room.control(
        "conn-b".to_string(),
        ControlAction::RemoveParticipant,
        Some("carol".to_string()),
    )
    .await?;

    let kicked = recv_event(&mut carol_rx, "kicked").await;
    assert!(kicked.contains("\"event\":\"kicked\""), "got: {kicked}");

    let state = room.get_state().await?;
    assert_eq!(state.peer_count, 2, "carol should be removed from the room");
    assert!(h.store.get_participant("room-1", "carol").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_participant_has_no_moderation_privileges() -> Result<(), anyhow::Error> {
    let h = harness(generous_limits());
    let room = h.registry.get_or_create_room("room-1".to_string()).await?;

    let _alice_rx = join(&room, "conn-a", "alice").await?;
    let _bob_rx = join(&room, "conn-b", "bob").await?;

    let result = room
        .control(
            "conn-b".to_string(),
            ControlAction::MuteParticipant,
            Some("alice".to_string()),
        )
        .await;
    assert!(matches!(
        result,
        Err(ScError::PermissionDenied(DenyReason::NoPrivileges))
    ));

    let result = room
        .control("conn-b".to_string(), ControlAction::MuteAll, None)
        .await;
    assert!(matches!(
        result,
        Err(ScError::PermissionDenied(DenyReason::NoAdminPrivileges))
    ));
    Ok(())
}

#[tokio::test]
async fn test_mute_all_locks_participants_but_not_cohosts() -> Result<(), anyhow::Error> {
    let h = harness(generous_limits());
    let room = h.registry.get_or_create_room("room-1".to_string()).await?;

    let _alice_rx = join(&room, "conn-a", "alice").await?;
    let _bob_rx = join(&room, "conn-b", "bob").await?;
    let mut carol_rx = join(&room, "conn-c", "carol").await?;

    room.control(
        "conn-a".to_string(),
        ControlAction::PromoteCoHost,
        Some("bob".to_string()),
    )
    .await?;

    room.control("conn-a".to_string(), ControlAction::MuteAll, None)
        .await?;

    let _ = recv_event(&mut carol_rx, "forceMute").await;

    // Carol is audio-locked: producing audio is refused.
    let result = produce_audio(&room, "conn-c").await;
    assert!(matches!(
        result,
        Err(ScError::PermissionDenied(DenyReason::AudioLockedByAdmin))
    ));

    // Privileged peers are exempt from the room-wide lock.
    produce_audio(&room, "conn-b").await?;

    // A targeted unlock lets Carol speak again.
    room.control(
        "conn-a".to_string(),
        ControlAction::UnmuteParticipant,
        Some("carol".to_string()),
    )
    .await?;
    let _ = recv_event(&mut carol_rx, "allowUnmute").await;
    produce_audio(&room, "conn-c").await?;
    Ok(())
}

#[tokio::test]
async fn test_disable_screen_share_blocks_new_shares() -> Result<(), anyhow::Error> {
    let h = harness(generous_limits());
    let room = h.registry.get_or_create_room("room-1".to_string()).await?;

    let _alice_rx = join(&room, "conn-a", "alice").await?;
    let mut bob_rx = join(&room, "conn-b", "bob").await?;

    room.control("conn-a".to_string(), ControlAction::DisableScreenShare, None)
        .await?;
    let _ = recv_event(&mut bob_rx, "screenShareGlobalUpdate").await;

    let transport = room
        .create_transport("conn-b".to_string(), TransportDirection::Send)
        .await?;
    let result = room
        .produce(
            "conn-b".to_string(),
            transport.transport_id.clone(),
            MediaKind::Video,
            serde_json::json!({}),
            true,
        )
        .await;
    assert!(matches!(
        result,
        Err(ScError::PermissionDenied(
            DenyReason::ScreenShareLockedByAdmin
        ))
    ));

    // Re-enabling clears both the room flag and the per-participant locks.
    room.control("conn-a".to_string(), ControlAction::EnableScreenShare, None)
        .await?;
    room.produce(
        "conn-b".to_string(),
        transport.transport_id,
        MediaKind::Video,
        serde_json::json!({}),
        true,
    )
    .await?;
    Ok(())
}

#[tokio::test]
async fn test_audit_trail_records_allowed_and_denied_actions() -> Result<(), anyhow::Error> {
    let h = harness(generous_limits());
    let room = h.registry.get_or_create_room("room-1".to_string()).await?;

    let _alice_rx = join(&room, "conn-a", "alice").await?;
    let _bob_rx = join(&room, "conn-b", "bob").await?;

    room.control(
        "conn-a".to_string(),
        ControlAction::MuteParticipant,
        Some("bob".to_string()),
    )
    .await?;

    let _ = room
        .control(
            "conn-b".to_string(),
            ControlAction::MuteParticipant,
            Some("alice".to_string()),
        )
        .await;

    let audit = room.get_audit().await?;
    assert_eq!(audit.len(), 2);

    let allowed = &audit[0];
    assert_eq!(allowed.result, AuditResult::Allowed);
    assert_eq!(allowed.actor_id, "alice");
    assert_eq!(allowed.target_id.as_deref(), Some("bob"));
    assert_eq!(allowed.action, ControlAction::MuteParticipant);
    assert!(allowed.reason.is_none());

    let denied = &audit[1];
    assert_eq!(denied.result, AuditResult::Denied);
    assert_eq!(denied.actor_id, "bob");
    assert_eq!(denied.reason, Some(DenyReason::NoPrivileges));
    Ok(())
}
