//! Append-only audit trail for privileged actions.

use crate::action::ControlAction;
use crate::permissions::DenyReason;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Default cap on retained entries. Oldest entries are dropped beyond the
/// cap so a hostile actor cannot grow the log without bound.
pub const DEFAULT_AUDIT_CAPACITY: usize = 10_000;

/// Outcome recorded for an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditResult {
    Allowed,
    Denied,
}

/// One immutable audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogEntry {
    /// The attempted action.
    pub action: ControlAction,
    /// Actor's user id.
    pub actor_id: String,
    /// Target's user id, when the action was targeted.
    pub target_id: Option<String>,
    /// Room the action was attempted in.
    pub room_id: String,
    /// Whether the action was allowed.
    pub result: AuditResult,
    /// Denial code, when denied.
    pub reason: Option<DenyReason>,
    /// Wall-clock time of the decision.
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit log, queryable by room.
#[derive(Debug)]
pub struct AuditLog {
    entries: VecDeque<AuditLogEntry>,
    capacity: usize,
}

impl AuditLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest when at capacity.
    pub fn record(&mut self, entry: AuditLogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Convenience constructor + append.
    #[allow(clippy::too_many_arguments)]
    pub fn record_decision(
        &mut self,
        room_id: &str,
        actor_id: &str,
        target_id: Option<&str>,
        action: ControlAction,
        allowed: bool,
        reason: Option<DenyReason>,
    ) {
        self.record(AuditLogEntry {
            action,
            actor_id: actor_id.to_string(),
            target_id: target_id.map(str::to_string),
            room_id: room_id.to_string(),
            result: if allowed {
                AuditResult::Allowed
            } else {
                AuditResult::Denied
            },
            reason,
            timestamp: Utc::now(),
        });
    }

    /// All entries for a room, oldest first.
    #[must_use]
    pub fn for_room(&self, room_id: &str) -> Vec<AuditLogEntry> {
        self.entries
            .iter()
            .filter(|e| e.room_id == room_id)
            .cloned()
            .collect()
    }

    /// Total retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}
