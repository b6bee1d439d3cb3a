//! Session Controller configuration.
//!
//! Configuration is loaded from environment variables with sensible
//! defaults; `from_vars` takes a plain map so tests can exercise every
//! path without touching the process environment.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default bind address for the signaling/health HTTP server.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:4443";

/// Default maximum concurrent rooms.
pub const DEFAULT_MAX_ROOMS: u32 = 1000;

/// Default maximum peers per room.
pub const DEFAULT_MAX_PEERS_PER_ROOM: u32 = 100;

/// Default privileged-action rate limit window in seconds.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 5;

/// Default privileged actions allowed per window.
pub const DEFAULT_RATE_LIMIT_MAX_ACTIONS: u32 = 10;

/// Default audit log capacity per room.
pub const DEFAULT_AUDIT_LOG_CAPACITY: usize = 10_000;

/// Default controller instance id prefix.
pub const DEFAULT_SC_ID_PREFIX: &str = "sc";

/// Session Controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address (WebSocket signaling + health endpoints).
    pub bind_address: String,

    /// Unique identifier for this controller instance.
    pub sc_id: String,

    /// Maximum concurrent rooms.
    pub max_rooms: u32,

    /// Maximum peers per room.
    pub max_peers_per_room: u32,

    /// Privileged-action rate limit window.
    pub rate_limit_window: Duration,

    /// Privileged actions allowed per window per actor.
    pub rate_limit_max_actions: u32,

    /// Audit log capacity per room.
    pub audit_log_capacity: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("SC_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let max_rooms = parse_or(vars, "SC_MAX_ROOMS", DEFAULT_MAX_ROOMS)?;
        let max_peers_per_room =
            parse_or(vars, "SC_MAX_PEERS_PER_ROOM", DEFAULT_MAX_PEERS_PER_ROOM)?;

        let rate_limit_window_seconds = parse_or(
            vars,
            "SC_RATE_LIMIT_WINDOW_SECONDS",
            DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
        )?;
        let rate_limit_max_actions = parse_or(
            vars,
            "SC_RATE_LIMIT_MAX_ACTIONS",
            DEFAULT_RATE_LIMIT_MAX_ACTIONS,
        )?;
        if rate_limit_window_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "SC_RATE_LIMIT_WINDOW_SECONDS must be positive".to_string(),
            ));
        }

        let audit_log_capacity =
            parse_or(vars, "SC_AUDIT_LOG_CAPACITY", DEFAULT_AUDIT_LOG_CAPACITY)?;

        // Generate controller instance id when not pinned by the deployment.
        let sc_id = vars.get("SC_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_SC_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            sc_id,
            max_rooms,
            max_peers_per_room,
            rate_limit_window: Duration::from_secs(rate_limit_window_seconds),
            rate_limit_max_actions,
            audit_log_capacity,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.max_rooms, DEFAULT_MAX_ROOMS);
        assert_eq!(config.max_peers_per_room, DEFAULT_MAX_PEERS_PER_ROOM);
        assert_eq!(
            config.rate_limit_window,
            Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECONDS)
        );
        assert_eq!(
            config.rate_limit_max_actions,
            DEFAULT_RATE_LIMIT_MAX_ACTIONS
        );
        assert_eq!(config.audit_log_capacity, DEFAULT_AUDIT_LOG_CAPACITY);
        assert!(config.sc_id.starts_with("sc-"));
    }

    #[test]
    fn test_from_vars_custom_values() {
        let vars = HashMap::from([
            ("SC_BIND_ADDRESS".to_string(), "127.0.0.1:5000".to_string()),
            ("SC_MAX_ROOMS".to_string(), "50".to_string()),
            ("SC_MAX_PEERS_PER_ROOM".to_string(), "8".to_string()),
            ("SC_RATE_LIMIT_WINDOW_SECONDS".to_string(), "10".to_string()),
            ("SC_RATE_LIMIT_MAX_ACTIONS".to_string(), "3".to_string()),
            ("SC_AUDIT_LOG_CAPACITY".to_string(), "100".to_string()),
            ("SC_ID".to_string(), "sc-custom-001".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load");

        assert_eq!(config.bind_address, "127.0.0.1:5000");
        assert_eq!(config.max_rooms, 50);
        assert_eq!(config.max_peers_per_room, 8);
        assert_eq!(config.rate_limit_window, Duration::from_secs(10));
        assert_eq!(config.rate_limit_max_actions, 3);
        assert_eq!(config.audit_log_capacity, 100);
        assert_eq!(config.sc_id, "sc-custom-001");
    }

    #[test]
    fn test_invalid_numeric_value_rejected() {
        let vars = HashMap::from([("SC_MAX_ROOMS".to_string(), "lots".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_zero_rate_limit_window_rejected() {
        let vars = HashMap::from([(
            "SC_RATE_LIMIT_WINDOW_SECONDS".to_string(),
            "0".to_string(),
        )]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }
}
