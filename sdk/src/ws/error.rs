//! WebSocket error types.
//!
//! Provides error types for WebSocket client operations.

use std::fmt;

use crate::error::SdkError;

/// WebSocket errors.
#[derive(Debug)]
pub enum WsError {
    /// Failed to serialize message.
    Serialization(String),

    /// Not connected; the envelope was dropped.
    NotConnected,

    /// Client has shut down.
    Closed,

    /// Invalid configuration.
    InvalidConfig(String),

    /// Send failed.
    SendFailed(String),
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialization(msg) => write!(f, "serialization failed: {}", msg),
            Self::NotConnected => write!(f, "not connected"),
            Self::Closed => write!(f, "client closed"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Self::SendFailed(msg) => write!(f, "send failed: {}", msg),
        }
    }
}

impl std::error::Error for WsError {}

impl From<SdkError> for WsError {
    fn from(err: SdkError) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_error_display() {
        let err = WsError::SendFailed("outbound queue full".to_string());
        assert_eq!(err.to_string(), "send failed: outbound queue full");
    }

    #[test]
    fn test_ws_error_not_connected() {
        let err = WsError::NotConnected;
        assert_eq!(err.to_string(), "not connected");
    }

    #[test]
    fn test_ws_error_closed() {
        let err = WsError::Closed;
        assert_eq!(err.to_string(), "client closed");
    }

    #[test]
    fn test_ws_error_from_sdk_error() {
        let err = WsError::from(SdkError::Serialization("bad".to_string()));
        assert!(matches!(err, WsError::Serialization(_)));
    }
}
