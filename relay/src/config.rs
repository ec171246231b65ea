//! Relay server configuration.
//!
//! Provides configuration options for the relay server.

use std::env;

use funnel_sdk::envelope::GREETING_MSG;

use crate::error::RelayError;

/// Default listen host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8787;

/// Default path that accepts WebSocket upgrades.
pub const DEFAULT_RELAY_PATH: &str = "/ws";

/// Default per-connection outbound queue capacity.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Configuration for the relay server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen host.
    pub host: String,

    /// Listen port.
    pub port: u16,

    /// The only path allowed to upgrade.
    pub relay_path: String,

    /// Text of the greeting sent on every accepted upgrade.
    pub greeting: String,

    /// Frames a connection may have queued before it counts as stale.
    pub outbound_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            relay_path: DEFAULT_RELAY_PATH.to_string(),
            greeting: GREETING_MSG.to_string(),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

impl ServerConfig {
    /// Creates a new configuration with the given host and port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Loads the configuration from `HOST` and `PORT`.
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` is set but is not a valid port number.
    pub fn from_env() -> Result<Self, RelayError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads the configuration through a variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` is set but is not a valid port number.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| RelayError::InvalidConfig(format!("PORT is not a valid port: {}", raw)))?,
            None => DEFAULT_PORT,
        };

        let config = Self::new(host, port);
        config.validate()?;
        Ok(config)
    }

    /// Sets the relay path.
    #[must_use]
    pub fn with_relay_path(mut self, path: impl Into<String>) -> Self {
        self.relay_path = path.into();
        self
    }

    /// Sets the greeting text.
    #[must_use]
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Sets the outbound queue capacity.
    #[must_use]
    pub fn with_outbound_buffer(mut self, capacity: usize) -> Self {
        self.outbound_buffer = capacity;
        self
    }

    /// Returns the `host:port` listen address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), RelayError> {
        if !self.relay_path.starts_with('/') {
            return Err(RelayError::InvalidConfig(
                "relay_path must start with '/'".to_string(),
            ));
        }

        if self.outbound_buffer == 0 {
            return Err(RelayError::InvalidConfig(
                "outbound_buffer must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
