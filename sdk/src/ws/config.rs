//! WebSocket client configuration.
//!
//! Provides configuration options for the reconnecting client.

use std::time::Duration;

use crate::envelope::Identity;

use super::error::WsError;

/// Default relay URL.
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8787/ws";

/// Default presence heartbeat interval in milliseconds.
pub const DEFAULT_HEARTBEAT_MS: u64 = 15_000;

/// Default reconnect delay floor in milliseconds.
pub const DEFAULT_RECONNECT_FLOOR_MS: u64 = 1_200;

/// Default reconnect delay ceiling in milliseconds.
pub const DEFAULT_RECONNECT_CEILING_MS: u64 = 8_000;

/// Default growth factor applied after each failed attempt.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.35;

/// Default capacity of the inbound envelope buffer.
pub const DEFAULT_EVENT_BUFFER: usize = 1_000;

/// Default capacity of the outbound frame queue.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Default time the writer gets to flush and close when a session ends.
pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 1_000;

/// Reconnecting client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay URL (`ws://` or `wss://`).
    pub url: String,

    /// Presence heartbeat interval.
    pub heartbeat_interval: Duration,

    /// Delay before the first reconnect and after every successful open.
    pub reconnect_floor: Duration,

    /// Upper bound on the reconnect delay.
    pub reconnect_ceiling: Duration,

    /// Growth factor applied to the delay after each scheduled retry.
    pub backoff_factor: f64,

    /// Identity stamped on client-generated envelopes.
    pub identity: Identity,

    /// Whether to send a `client_hello` envelope on every open.
    pub send_hello: bool,

    /// Audience site URL stamped on client-generated envelopes.
    pub site_url: Option<String>,

    /// Page URL stamped on client-generated envelopes.
    pub page_url: Option<String>,

    /// Capacity of the inbound envelope buffer.
    pub event_buffer: usize,

    /// Frames that may wait for the writer before sends are refused.
    pub outbound_buffer: usize,

    /// How long a closing session may spend flushing before the writer
    /// is aborted.
    pub close_timeout: Duration,

    /// Funnel step stamped as `page` on client-generated envelopes.
    pub page: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            reconnect_floor: Duration::from_millis(DEFAULT_RECONNECT_FLOOR_MS),
            reconnect_ceiling: Duration::from_millis(DEFAULT_RECONNECT_CEILING_MS),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            identity: Identity::generate(),
            send_hello: true,
            site_url: None,
            page_url: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            close_timeout: Duration::from_millis(DEFAULT_CLOSE_TIMEOUT_MS),
            page: None,
        }
    }
}

impl ClientConfig {
    /// Creates a new configuration with the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the reconnect delay floor.
    #[must_use]
    pub fn with_reconnect_floor(mut self, delay: Duration) -> Self {
        self.reconnect_floor = delay;
        self
    }

    /// Sets the reconnect delay ceiling.
    #[must_use]
    pub fn with_reconnect_ceiling(mut self, delay: Duration) -> Self {
        self.reconnect_ceiling = delay;
        self
    }

    /// Sets the backoff growth factor.
    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Sets the identity.
    #[must_use]
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// Enables or disables the `client_hello` envelope.
    #[must_use]
    pub fn with_hello(mut self, send_hello: bool) -> Self {
        self.send_hello = send_hello;
        self
    }

    /// Sets the audience site URL.
    #[must_use]
    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = Some(site_url.into());
        self
    }

    /// Sets the page URL.
    #[must_use]
    pub fn with_page_url(mut self, page_url: impl Into<String>) -> Self {
        self.page_url = Some(page_url.into());
        self
    }

    /// Sets the inbound envelope buffer capacity.
    #[must_use]
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Sets the outbound frame queue capacity.
    #[must_use]
    pub fn with_outbound_buffer(mut self, capacity: usize) -> Self {
        self.outbound_buffer = capacity;
        self
    }

    /// Sets the close timeout.
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Sets the initial funnel step.
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), WsError> {
        if self.url.is_empty() {
            return Err(WsError::InvalidConfig("url cannot be empty".to_string()));
        }

        if !self.url.starts_with("ws://") && !self.url.starts_with("wss://") {
            return Err(WsError::InvalidConfig(
                "url must start with ws:// or wss://".to_string(),
            ));
        }

        if self.heartbeat_interval.is_zero() {
            return Err(WsError::InvalidConfig(
                "heartbeat_interval must be > 0".to_string(),
            ));
        }

        if self.reconnect_floor.is_zero() || self.reconnect_floor > self.reconnect_ceiling {
            return Err(WsError::InvalidConfig(
                "reconnect_floor must be > 0 and <= reconnect_ceiling".to_string(),
            ));
        }

        if self.backoff_factor.is_nan() || self.backoff_factor <= 1.0 {
            return Err(WsError::InvalidConfig(
                "backoff_factor must be > 1.0".to_string(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(WsError::InvalidConfig(
                "event_buffer must be > 0".to_string(),
            ));
        }

        if self.outbound_buffer == 0 {
            return Err(WsError::InvalidConfig(
                "outbound_buffer must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
