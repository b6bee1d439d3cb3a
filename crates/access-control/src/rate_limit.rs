//! Fixed-window rate limiting for privileged actions.
//!
//! Deliberately a fixed window, not a sliding one: a burst straddling a
//! window boundary can briefly exceed the nominal rate. That semantic is
//! part of the protocol contract and is preserved here.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Default number of actions allowed per window.
pub const DEFAULT_MAX_ACTIONS: u32 = 10;

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Window length.
    pub window: Duration,
    /// Actions allowed per window per actor.
    pub max_actions: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_actions: DEFAULT_MAX_ACTIONS,
        }
    }
}

/// Per-actor window state. Reset lazily on the first check after expiry.
#[derive(Debug, Clone, Copy)]
struct WindowState {
    count: u32,
    window_started: Instant,
}

/// Fixed-window per-actor rate limiter.
///
/// Owned by a single room actor, so no interior locking is needed.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    states: HashMap<String, WindowState>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    /// Record an action attempt for `actor_id`. Returns `true` when the
    /// action is within the limit, `false` when it must be rejected.
    pub fn check(&mut self, actor_id: &str) -> bool {
        self.check_at(actor_id, Instant::now())
    }

    /// Clock-injectable form of [`RateLimiter::check`] for tests.
    pub fn check_at(&mut self, actor_id: &str, now: Instant) -> bool {
        let state = self
            .states
            .entry(actor_id.to_string())
            .or_insert(WindowState {
                count: 0,
                window_started: now,
            });

        if now.duration_since(state.window_started) >= self.config.window {
            state.count = 0;
            state.window_started = now;
        }

        if state.count >= self.config.max_actions {
            return false;
        }
        state.count += 1;
        true
    }

    /// Drop an actor's window state (actor left the room).
    pub fn forget(&mut self, actor_id: &str) {
        self.states.remove(actor_id);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_limit_then_denies() {
        let mut limiter = RateLimiter::default();
        let now = Instant::now();

        for i in 0..DEFAULT_MAX_ACTIONS {
            assert!(limiter.check_at("actor-1", now), "action {i} should pass");
        }
        assert!(!limiter.check_at("actor-1", now), "11th action must fail");
    }

    #[test]
    fn test_window_resets_lazily() {
        let mut limiter = RateLimiter::default();
        let start = Instant::now();

        for _ in 0..DEFAULT_MAX_ACTIONS {
            assert!(limiter.check_at("actor-1", start));
        }
        assert!(!limiter.check_at("actor-1", start));

        // First check after expiry resets the window.
        let later = start + DEFAULT_WINDOW + Duration::from_millis(1);
        assert!(limiter.check_at("actor-1", later));
    }

    #[test]
    fn test_actors_are_independent() {
        let mut limiter = RateLimiter::default();
        let now = Instant::now();

        for _ in 0..DEFAULT_MAX_ACTIONS {
            assert!(limiter.check_at("actor-1", now));
        }
        assert!(!limiter.check_at("actor-1", now));
        assert!(limiter.check_at("actor-2", now));
    }

    #[test]
    fn test_boundary_burst_is_permitted() {
        // Fixed-window semantics: max_actions at the end of one window plus
        // max_actions at the start of the next may land back to back.
        let config = RateLimitConfig {
            window: Duration::from_secs(5),
            max_actions: 3,
        };
        let mut limiter = RateLimiter::new(config);
        let start = Instant::now();

        let end_of_window = start + Duration::from_millis(4_900);
        for _ in 0..3 {
            assert!(limiter.check_at("actor-1", end_of_window));
        }

        let next_window = start + Duration::from_millis(10_000);
        for _ in 0..3 {
            assert!(limiter.check_at("actor-1", next_window));
        }
    }

    #[test]
    fn test_forget_clears_state() {
        let mut limiter = RateLimiter::default();
        let now = Instant::now();

        for _ in 0..DEFAULT_MAX_ACTIONS {
            assert!(limiter.check_at("actor-1", now));
        }
        assert!(!limiter.check_at("actor-1", now));

        limiter.forget("actor-1");
        assert!(limiter.check_at("actor-1", now));
    }
}
