//! Chat room configuration.
//!
//! Configuration is loaded from environment variables. The JWT secret
//! is redacted in Debug output.

use std::collections::HashMap;
use std::env;
use std::fmt;

use secrecy::SecretString;
use thiserror::Error;

/// Default HTTP/WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default room identifier.
pub const DEFAULT_ROOM_ID: &str = "lobby";

/// Default per-client outbound queue capacity.
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Default maximum inbound frame size in bytes.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 512;

/// Default read deadline in seconds, refreshed on each heartbeat
/// response. The outbound heartbeat period is 0.9x this window.
pub const DEFAULT_PONG_TIMEOUT_SECONDS: u64 = 60;

/// Chat room configuration.
///
/// Loaded from environment variables with sensible defaults. The JWT
/// secret is required and redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// HTTP/WebSocket bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Identifier of the single room this process hosts.
    pub room_id: String,

    /// Per-client outbound queue capacity. Overflow evicts the client.
    pub outbound_queue_capacity: usize,

    /// Maximum inbound frame size in bytes.
    pub max_frame_bytes: usize,

    /// Read deadline in seconds.
    pub pong_timeout_seconds: u64,

    /// HMAC secret for admission token validation.
    /// Protected by `SecretString` to prevent accidental logging.
    pub jwt_secret: SecretString,
}

/// Custom Debug implementation that redacts the JWT secret.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("room_id", &self.room_id)
            .field("outbound_queue_capacity", &self.outbound_queue_capacity)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .field("pong_timeout_seconds", &self.pong_timeout_seconds)
            .field("jwt_secret", &"[REDACTED]")
            .finish()
    }
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
        let jwt_secret = SecretString::from(
            vars.get("CHAT_JWT_SECRET")
                .ok_or_else(|| ConfigError::MissingEnvVar("CHAT_JWT_SECRET".to_string()))?
                .clone(),
        );

        let bind_address = vars
            .get("CHAT_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let room_id = vars
            .get("CHAT_ROOM_ID")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ROOM_ID.to_string());

        let outbound_queue_capacity = parse_var(
            vars,
            "CHAT_OUTBOUND_QUEUE_CAPACITY",
            DEFAULT_OUTBOUND_QUEUE_CAPACITY,
        )?;

        let max_frame_bytes = parse_var(vars, "CHAT_MAX_FRAME_BYTES", DEFAULT_MAX_FRAME_BYTES)?;

        let pong_timeout_seconds = parse_var(
            vars,
            "CHAT_PONG_TIMEOUT_SECONDS",
            DEFAULT_PONG_TIMEOUT_SECONDS,
        )?;

        if pong_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "CHAT_PONG_TIMEOUT_SECONDS must be non-zero".to_string(),
            ));
        }
        if outbound_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "CHAT_OUTBOUND_QUEUE_CAPACITY must be non-zero".to_string(),
            ));
        }

        Ok(Config {
            bind_address,
            room_id,
            outbound_queue_capacity,
            max_frame_bytes,
            pong_timeout_seconds,
            jwt_secret,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={value}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "CHAT_JWT_SECRET".to_string(),
            "test-secret-1234567890".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.room_id, DEFAULT_ROOM_ID);
        assert_eq!(
            config.outbound_queue_capacity,
            DEFAULT_OUTBOUND_QUEUE_CAPACITY
        );
        assert_eq!(config.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
        assert_eq!(config.pong_timeout_seconds, DEFAULT_PONG_TIMEOUT_SECONDS);
        assert_eq!(config.jwt_secret.expose_secret(), "test-secret-1234567890");
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("CHAT_BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("CHAT_ROOM_ID".to_string(), "ops-war-room".to_string());
        vars.insert("CHAT_OUTBOUND_QUEUE_CAPACITY".to_string(), "32".to_string());
        vars.insert("CHAT_MAX_FRAME_BYTES".to_string(), "1024".to_string());
        vars.insert("CHAT_PONG_TIMEOUT_SECONDS".to_string(), "30".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.room_id, "ops-war-room");
        assert_eq!(config.outbound_queue_capacity, 32);
        assert_eq!(config.max_frame_bytes, 1024);
        assert_eq!(config.pong_timeout_seconds, 30);
    }

    #[test]
    fn test_from_vars_missing_jwt_secret() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "CHAT_JWT_SECRET"));
    }

    #[test]
    fn test_from_vars_rejects_garbage_numbers() {
        let mut vars = base_vars();
        vars.insert("CHAT_MAX_FRAME_BYTES".to_string(), "lots".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_from_vars_rejects_zero_deadline() {
        let mut vars = base_vars();
        vars.insert("CHAT_PONG_TIMEOUT_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_debug_redacts_jwt_secret() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("test-secret"));
    }
}
