//! Permission evaluation.
//!
//! [`PermissionEngine::check`] implements the privileged-action policy as a
//! pure function over resolved roles. The caller (the signaling gateway)
//! resolves persisted roles and target context; nothing here touches
//! storage, so a decision is fully determined by its inputs.
//!
//! The targeted-action policy is a static decision table over
//! (action, actor role, target role). The table encodes exactly:
//!
//! | actor       | may do                                                  |
//! |-------------|---------------------------------------------------------|
//! | Host        | anything to anyone except itself                        |
//! | CoHost      | moderate Participants and fellow CoHosts, never Host,   |
//! |             | and never change role assignments                        |
//! | Participant | nothing privileged                                      |
//!
//! One rule is applied after the table: removing a participant may never
//! target the room's original creator.

use crate::action::ControlAction;
use crate::role::Role;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, machine-readable denial codes returned to clients and written
/// to the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    /// Actor has no persisted record in the room.
    ActorNotFound,
    /// Room-wide action from a non-privileged actor.
    NoAdminPrivileges,
    /// Targeted action without a target id (malformed request).
    TargetRequired,
    /// Target has no persisted record in the room.
    TargetNotFound,
    /// Actor targeted itself.
    CannotTargetSelf,
    /// Removal may never target the room creator.
    CannotKickCreator,
    /// Co-hosts may not remove the host.
    CohostCannotKickHost,
    /// Co-hosts may not moderate the host.
    CohostCannotTargetHost,
    /// Co-hosts may not change role assignments.
    CohostCannotChangeRoles,
    /// Participants hold no privileged action rights.
    NoPrivileges,
    /// Actor exceeded the action rate limit.
    RateLimitExceeded,
    /// Internal failure during evaluation; deny without auditing.
    PermissionCheckError,
    /// Audio is locked by an admin; self-unmute refused.
    AudioLockedByAdmin,
    /// Screen share is locked by an admin for this participant.
    ScreenShareLockedByAdmin,
    /// Screen sharing is disabled room-wide.
    ScreenShareDisabled,
}

impl DenyReason {
    /// Wire code, stable across releases.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DenyReason::ActorNotFound => "ACTOR_NOT_FOUND",
            DenyReason::NoAdminPrivileges => "NO_ADMIN_PRIVILEGES",
            DenyReason::TargetRequired => "TARGET_REQUIRED",
            DenyReason::TargetNotFound => "TARGET_NOT_FOUND",
            DenyReason::CannotTargetSelf => "CANNOT_TARGET_SELF",
            DenyReason::CannotKickCreator => "CANNOT_KICK_CREATOR",
            DenyReason::CohostCannotKickHost => "COHOST_CANNOT_KICK_HOST",
            DenyReason::CohostCannotTargetHost => "COHOST_CANNOT_TARGET_HOST",
            DenyReason::CohostCannotChangeRoles => "COHOST_CANNOT_CHANGE_ROLES",
            DenyReason::NoPrivileges => "NO_PRIVILEGES",
            DenyReason::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            DenyReason::PermissionCheckError => "PERMISSION_CHECK_ERROR",
            DenyReason::AudioLockedByAdmin => "AUDIO_LOCKED_BY_ADMIN",
            DenyReason::ScreenShareLockedByAdmin => "SCREEN_SHARE_LOCKED_BY_ADMIN",
            DenyReason::ScreenShareDisabled => "SCREEN_SHARE_DISABLED",
        }
    }

    /// Human-readable explanation suitable for client display.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            DenyReason::ActorNotFound => "You are not a member of this room",
            DenyReason::NoAdminPrivileges => "Only the host or a co-host can do that",
            DenyReason::TargetRequired => "This action requires a target participant",
            DenyReason::TargetNotFound => "Target participant not found in this room",
            DenyReason::CannotTargetSelf => "You cannot apply this action to yourself",
            DenyReason::CannotKickCreator => "The room creator cannot be removed",
            DenyReason::CohostCannotKickHost => "A co-host cannot remove the host",
            DenyReason::CohostCannotTargetHost => "A co-host cannot moderate the host",
            DenyReason::CohostCannotChangeRoles => "Only the host can change roles",
            DenyReason::NoPrivileges => "You do not have moderation privileges",
            DenyReason::RateLimitExceeded => "Too many actions, slow down",
            DenyReason::PermissionCheckError => "Permission check failed, try again",
            DenyReason::AudioLockedByAdmin => "You were muted by the host and cannot unmute",
            DenyReason::ScreenShareLockedByAdmin => {
                "Screen sharing was disabled for you by the host"
            }
            DenyReason::ScreenShareDisabled => "Screen sharing is disabled in this room",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved context about the target of a privileged action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetContext {
    /// Persisted role, `None` when the target id resolved to nothing.
    pub role: Option<Role>,
    /// Target id equals the actor id.
    pub is_self: bool,
    /// Target is the room's original creator.
    pub is_creator: bool,
}

/// A fully resolved permission check request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionRequest {
    /// Actor's persisted role, `None` when the actor is unknown in the room.
    pub actor_role: Option<Role>,
    /// The action being attempted.
    pub action: ControlAction,
    /// Target context; `None` when the request carried no target id.
    pub target: Option<TargetContext>,
}

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionDecision {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Denial code when not allowed.
    pub reason: Option<DenyReason>,
    /// Whether the caller should write an audit entry for this decision.
    pub should_audit: bool,
}

impl PermissionDecision {
    const fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            should_audit: true,
        }
    }

    const fn deny(reason: DenyReason, should_audit: bool) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            should_audit,
        }
    }
}

/// The policy evaluator. Stateless; one shared instance serves all rooms.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissionEngine;

impl PermissionEngine {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Evaluate a privileged action request.
    #[must_use]
    pub fn check(&self, request: &PermissionRequest) -> PermissionDecision {
        let Some(actor_role) = request.actor_role else {
            return PermissionDecision::deny(DenyReason::ActorNotFound, true);
        };

        if request.action.is_room_wide() {
            return if actor_role.is_privileged() {
                PermissionDecision::allow()
            } else {
                PermissionDecision::deny(DenyReason::NoAdminPrivileges, true)
            };
        }

        // Targeted action. A missing target is a malformed request, not a
        // security event.
        let Some(target) = request.target else {
            return PermissionDecision::deny(DenyReason::TargetRequired, false);
        };
        let Some(target_role) = target.role else {
            return PermissionDecision::deny(DenyReason::TargetNotFound, true);
        };
        if target.is_self {
            return PermissionDecision::deny(DenyReason::CannotTargetSelf, true);
        }

        if let Err(reason) = table_decision(request.action, actor_role, target_role) {
            return PermissionDecision::deny(reason, true);
        }

        // Post-table rule: the creator is never removable, whoever asks.
        if request.action == ControlAction::RemoveParticipant && target.is_creator {
            return PermissionDecision::deny(DenyReason::CannotKickCreator, true);
        }

        PermissionDecision::allow()
    }
}

/// The static (action, actor role, target role) decision table.
const fn table_decision(
    action: ControlAction,
    actor: Role,
    target: Role,
) -> Result<(), DenyReason> {
    match actor {
        // Host may do anything to anyone (self-targeting was rejected above).
        Role::Host => Ok(()),

        Role::CoHost => {
            if action.changes_roles() {
                return Err(DenyReason::CohostCannotChangeRoles);
            }
            match target {
                Role::Host => {
                    if matches!(action, ControlAction::RemoveParticipant) {
                        Err(DenyReason::CohostCannotKickHost)
                    } else {
                        Err(DenyReason::CohostCannotTargetHost)
                    }
                }
                // Co-hosts may moderate participants and fellow co-hosts.
                Role::CoHost | Role::Participant => Ok(()),
            }
        }

        Role::Participant => Err(DenyReason::NoPrivileges),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request(
        actor: Option<Role>,
        action: ControlAction,
        target: Option<TargetContext>,
    ) -> PermissionRequest {
        PermissionRequest {
            actor_role: actor,
            action,
            target,
        }
    }

    fn plain_target(role: Role) -> TargetContext {
        TargetContext {
            role: Some(role),
            is_self: false,
            is_creator: false,
        }
    }

    #[test]
    fn test_unknown_actor_denied_and_audited() {
        let engine = PermissionEngine::new();
        let decision = engine.check(&request(None, ControlAction::MuteAll, None));
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::ActorNotFound));
        assert!(decision.should_audit);
    }

    #[test]
    fn test_room_wide_requires_privilege() {
        let engine = PermissionEngine::new();

        for actor in [Role::Host, Role::CoHost] {
            let decision = engine.check(&request(Some(actor), ControlAction::MuteAll, None));
            assert!(decision.allowed, "{actor} should pass room-wide check");
        }

        let decision = engine.check(&request(
            Some(Role::Participant),
            ControlAction::MuteAll,
            None,
        ));
        assert_eq!(decision.reason, Some(DenyReason::NoAdminPrivileges));
        assert!(decision.should_audit);
    }

    #[test]
    fn test_missing_target_is_malformed_not_audited() {
        let engine = PermissionEngine::new();
        let decision = engine.check(&request(
            Some(Role::Host),
            ControlAction::MuteParticipant,
            None,
        ));
        assert_eq!(decision.reason, Some(DenyReason::TargetRequired));
        assert!(!decision.should_audit);
    }

    #[test]
    fn test_unknown_target_denied() {
        let engine = PermissionEngine::new();
        let decision = engine.check(&request(
            Some(Role::Host),
            ControlAction::MuteParticipant,
            Some(TargetContext {
                role: None,
                is_self: false,
                is_creator: false,
            }),
        ));
        assert_eq!(decision.reason, Some(DenyReason::TargetNotFound));
    }

    #[test]
    fn test_self_targeting_rejected() {
        let engine = PermissionEngine::new();
        let decision = engine.check(&request(
            Some(Role::Host),
            ControlAction::MuteParticipant,
            Some(TargetContext {
                role: Some(Role::Host),
                is_self: true,
                is_creator: true,
            }),
        ));
        assert_eq!(decision.reason, Some(DenyReason::CannotTargetSelf));
    }

    #[test]
    fn test_host_may_moderate_anyone() {
        let engine = PermissionEngine::new();
        for target in [Role::CoHost, Role::Participant] {
            for action in [
                ControlAction::MuteParticipant,
                ControlAction::DisableCamera,
                ControlAction::PromoteCoHost,
                ControlAction::DemoteCoHost,
                ControlAction::RemoveParticipant,
            ] {
                let decision =
                    engine.check(&request(Some(Role::Host), action, Some(plain_target(target))));
                assert!(decision.allowed, "host {action} vs {target} should pass");
                assert!(decision.should_audit);
            }
        }
    }

    #[test]
    fn test_cohost_may_moderate_participants_and_cohosts() {
        let engine = PermissionEngine::new();
        for target in [Role::CoHost, Role::Participant] {
            let decision = engine.check(&request(
                Some(Role::CoHost),
                ControlAction::MuteParticipant,
                Some(plain_target(target)),
            ));
            assert!(decision.allowed);
        }
    }

    #[test]
    fn test_cohost_never_touches_host() {
        let engine = PermissionEngine::new();

        let decision = engine.check(&request(
            Some(Role::CoHost),
            ControlAction::RemoveParticipant,
            Some(plain_target(Role::Host)),
        ));
        assert_eq!(decision.reason, Some(DenyReason::CohostCannotKickHost));

        let decision = engine.check(&request(
            Some(Role::CoHost),
            ControlAction::MuteParticipant,
            Some(plain_target(Role::Host)),
        ));
        assert_eq!(decision.reason, Some(DenyReason::CohostCannotTargetHost));
    }

    #[test]
    fn test_cohost_cannot_change_roles() {
        let engine = PermissionEngine::new();
        for action in [
            ControlAction::PromoteCoHost,
            ControlAction::DemoteCoHost,
            ControlAction::PromoteHost,
            ControlAction::DemoteHost,
        ] {
            let decision = engine.check(&request(
                Some(Role::CoHost),
                action,
                Some(plain_target(Role::Participant)),
            ));
            assert_eq!(decision.reason, Some(DenyReason::CohostCannotChangeRoles));
        }
    }

    #[test]
    fn test_participant_has_no_privileges() {
        let engine = PermissionEngine::new();
        let decision = engine.check(&request(
            Some(Role::Participant),
            ControlAction::MuteParticipant,
            Some(plain_target(Role::Participant)),
        ));
        assert_eq!(decision.reason, Some(DenyReason::NoPrivileges));
    }

    #[test]
    fn test_creator_is_never_removable_even_by_host() {
        let engine = PermissionEngine::new();
        let decision = engine.check(&request(
            Some(Role::Host),
            ControlAction::RemoveParticipant,
            Some(TargetContext {
                role: Some(Role::Host),
                is_self: false,
                is_creator: true,
            }),
        ));
        assert_eq!(decision.reason, Some(DenyReason::CannotKickCreator));
        assert!(decision.should_audit);
    }

    #[test]
    fn test_creator_rule_only_applies_to_removal() {
        let engine = PermissionEngine::new();
        let decision = engine.check(&request(
            Some(Role::Host),
            ControlAction::MuteParticipant,
            Some(TargetContext {
                role: Some(Role::CoHost),
                is_self: false,
                is_creator: true,
            }),
        ));
        assert!(decision.allowed);
    }

    #[test]
    fn test_check_is_deterministic() {
        let engine = PermissionEngine::new();
        let req = request(
            Some(Role::CoHost),
            ControlAction::RemoveParticipant,
            Some(plain_target(Role::Host)),
        );
        let first = engine.check(&req);
        for _ in 0..10 {
            assert_eq!(engine.check(&req), first);
        }
    }
}
