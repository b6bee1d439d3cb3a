//! Access control engine for session moderation.
//!
//! Pure policy evaluation with no I/O: the caller resolves persisted roles
//! and hands them to [`PermissionEngine::check`], which returns an
//! allow/deny decision with a stable reason code. Rate limiting and the
//! audit trail live here as well so every privileged path shares one
//! implementation.
//!
//! # Components
//!
//! - [`permissions`] - the (action, actor role, target role) decision table
//! - [`rate_limit`] - fixed-window per-actor rate limiter
//! - [`audit`] - append-only, per-room-queryable audit log
//! - [`role`] / [`action`] - the shared vocabulary types
//!
//! The engine is deterministic: identical inputs always produce identical
//! decisions, which the service relies on when it re-checks after a
//! suspension point.

pub mod action;
pub mod audit;
pub mod permissions;
pub mod rate_limit;
pub mod role;

pub use action::ControlAction;
pub use audit::{AuditLog, AuditLogEntry, AuditResult};
pub use permissions::{
    DenyReason, PermissionDecision, PermissionEngine, PermissionRequest, TargetContext,
};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use role::Role;
