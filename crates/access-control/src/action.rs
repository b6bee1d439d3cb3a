//! Privileged control actions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A privileged action an actor can request against a room or a target
/// participant.
///
/// Room-wide actions apply to every non-privileged participant at once;
/// targeted actions require an explicit target. The classification drives
/// which branch of the permission algorithm runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlAction {
    /// Mute one participant's audio and lock self-unmute.
    MuteParticipant,
    /// Clear one participant's audio lock.
    UnmuteParticipant,
    /// Mute every non-privileged participant and lock self-unmute.
    MuteAll,
    /// Clear the room-wide audio lock.
    UnmuteAll,
    /// Pause one participant's video.
    DisableCamera,
    /// Allow one participant's video again.
    EnableCamera,
    /// Pause video for every non-privileged participant.
    DisableAllCameras,
    /// Allow video again for every non-privileged participant.
    EnableAllCameras,
    /// Enable screen sharing room-wide.
    EnableScreenShare,
    /// Disable screen sharing room-wide and lock self-share.
    DisableScreenShare,
    /// Promote a participant to co-host.
    PromoteCoHost,
    /// Demote a co-host to participant.
    DemoteCoHost,
    /// Transfer/grant the host role.
    PromoteHost,
    /// Revoke the host role.
    DemoteHost,
    /// Remove a participant from the room.
    RemoveParticipant,
}

impl ControlAction {
    /// Room-wide actions follow the simpler host-or-co-host rule and take
    /// no target.
    #[must_use]
    pub const fn is_room_wide(self) -> bool {
        matches!(
            self,
            ControlAction::MuteAll
                | ControlAction::UnmuteAll
                | ControlAction::DisableAllCameras
                | ControlAction::EnableAllCameras
                | ControlAction::EnableScreenShare
                | ControlAction::DisableScreenShare
        )
    }

    /// Role-assignment actions are reserved to hosts regardless of target.
    #[must_use]
    pub const fn changes_roles(self) -> bool {
        matches!(
            self,
            ControlAction::PromoteCoHost
                | ControlAction::DemoteCoHost
                | ControlAction::PromoteHost
                | ControlAction::DemoteHost
        )
    }

    /// Stable string form for audit entries and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ControlAction::MuteParticipant => "muteParticipant",
            ControlAction::UnmuteParticipant => "unmuteParticipant",
            ControlAction::MuteAll => "muteAll",
            ControlAction::UnmuteAll => "unmuteAll",
            ControlAction::DisableCamera => "disableCamera",
            ControlAction::EnableCamera => "enableCamera",
            ControlAction::DisableAllCameras => "disableAllCameras",
            ControlAction::EnableAllCameras => "enableAllCameras",
            ControlAction::EnableScreenShare => "enableScreenShare",
            ControlAction::DisableScreenShare => "disableScreenShare",
            ControlAction::PromoteCoHost => "promoteCoHost",
            ControlAction::DemoteCoHost => "demoteCoHost",
            ControlAction::PromoteHost => "promoteHost",
            ControlAction::DemoteHost => "demoteHost",
            ControlAction::RemoveParticipant => "removeParticipant",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_room_wide_classification() {
        assert!(ControlAction::MuteAll.is_room_wide());
        assert!(ControlAction::EnableScreenShare.is_room_wide());
        assert!(!ControlAction::MuteParticipant.is_room_wide());
        assert!(!ControlAction::RemoveParticipant.is_room_wide());
    }

    #[test]
    fn test_role_change_classification() {
        assert!(ControlAction::PromoteCoHost.changes_roles());
        assert!(ControlAction::DemoteHost.changes_roles());
        assert!(!ControlAction::MuteAll.changes_roles());
        assert!(!ControlAction::RemoveParticipant.changes_roles());
    }

    #[test]
    fn test_wire_form_matches_as_str() {
        let json = serde_json::to_string(&ControlAction::PromoteCoHost).unwrap();
        assert_eq!(json, "\"promoteCoHost\"");
        assert_eq!(ControlAction::PromoteCoHost.as_str(), "promoteCoHost");
    }
}
