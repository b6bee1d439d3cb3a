//! Participant roles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role persisted per (room, user) pair.
///
/// `Host` is assigned at room creation (the creator) or explicitly by
/// another host. `CoHost` and `Participant` are promotable/demotable only
/// by a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Host,
    CoHost,
    Participant,
}

impl Role {
    /// Whether this role is exempt from room-wide moderation effects and
    /// from lock-flag enforcement on self-service actions.
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        matches!(self, Role::Host | Role::CoHost)
    }

    /// Stable string form used in persisted records and audit entries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Host => "HOST",
            Role::CoHost => "CO_HOST",
            Role::Participant => "PARTICIPANT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_privileged_roles() {
        assert!(Role::Host.is_privileged());
        assert!(Role::CoHost.is_privileged());
        assert!(!Role::Participant.is_privileged());
    }

    #[test]
    fn test_serde_wire_form() {
        assert_eq!(serde_json::to_string(&Role::CoHost).unwrap(), "\"CO_HOST\"");
        let role: Role = serde_json::from_str("\"HOST\"").unwrap();
        assert_eq!(role, Role::Host);
    }
}
