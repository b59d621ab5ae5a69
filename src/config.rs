//! Configuration management for the chat relay
//!
//! Settings come from an optional `config.toml` with environment overrides
//! (`CHAT_RELAY_PORT`, `CHAT_RELAY_MAILBOX_CAPACITY`, ...). Every value has a
//! default, so the relay starts with no file at all.

use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "CHAT_RELAY";

/// Smallest frame limit accepted; anything lower cannot carry a presence update.
const MIN_FRAME_BYTES: usize = 1024;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    // ═══ NETWORK ═══
    /// IP address the listener binds to
    pub bind_address: String,

    /// TCP port of the listener
    pub port: u16,

    // ═══ SESSIONS ═══
    /// Outbound mailbox capacity per session; overflow is dropped
    pub mailbox_capacity: usize,

    /// Capacity of the hub's event queue
    pub event_queue_capacity: usize,

    /// A session receiving nothing for this long is disconnected
    pub idle_timeout_secs: u64,

    /// Deadline for writing one outbound frame
    pub write_timeout_secs: u64,

    /// Largest accepted frame payload
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            mailbox_capacity: 256,
            event_queue_capacity: 1024,
            idle_timeout_secs: 120,
            write_timeout_secs: 10,
            max_frame_bytes: 16 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `config.toml` (if present) with environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from the named file (extension optional) with
    /// environment overrides. A missing file is not an error.
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.bind_address.is_empty() {
            return Err(config::ConfigError::Message(
                "bind_address cannot be empty".into(),
            ));
        }

        if self.mailbox_capacity == 0 {
            return Err(config::ConfigError::Message(
                "mailbox_capacity must be greater than 0".into(),
            ));
        }

        if self.event_queue_capacity == 0 {
            return Err(config::ConfigError::Message(
                "event_queue_capacity must be greater than 0".into(),
            ));
        }

        if self.idle_timeout_secs == 0 || self.write_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "timeouts must be greater than 0".into(),
            ));
        }

        if self.max_frame_bytes < MIN_FRAME_BYTES {
            return Err(config::ConfigError::Message(format!(
                "max_frame_bytes must be at least {MIN_FRAME_BYTES}"
            )));
        }

        Ok(())
    }

    /// Get bind address and port as a socket address string
    pub fn listen_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_socket(), "0.0.0.0:8080");
        assert_eq!(config.idle_timeout(), Duration::from_secs(120));
        assert_eq!(config.mailbox_capacity, 256);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = ServerConfig::load_from("definitely/not/here/relay").unwrap();
        assert_eq!(config.port, ServerConfig::default().port);
        assert_eq!(config.max_frame_bytes, ServerConfig::default().max_frame_bytes);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let config = ServerConfig {
            mailbox_capacity: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_tiny_frame_limit() {
        let config = ServerConfig {
            max_frame_bytes: 16,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = ServerConfig {
            idle_timeout_secs: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
