//! Relay error types.

/// Relay errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Binding or serving failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::InvalidConfig("PORT is not a valid port: x".to_string());
        assert_eq!(
            err.to_string(),
            "invalid configuration: PORT is not a valid port: x"
        );
    }

    #[test]
    fn test_error_from_io() {
        let err = RelayError::from(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "address in use",
        ));
        assert!(matches!(err, RelayError::Io(_)));
    }
}
