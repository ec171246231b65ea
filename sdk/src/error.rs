//! SDK error types.
//!
//! Provides error types for envelope encoding and decoding.

/// SDK errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SdkError {
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The frame is valid JSON but not an envelope.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() {
            Self::InvalidEnvelope(err.to_string())
        } else {
            Self::Deserialization(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SdkError::Deserialization("EOF while parsing".to_string());
        assert_eq!(err.to_string(), "deserialization error: EOF while parsing");
    }

    #[test]
    fn test_error_from_syntax_error() {
        let err = serde_json::from_str::<serde_json::Value>("{").expect_err("syntax");
        assert!(matches!(SdkError::from(err), SdkError::Deserialization(_)));
    }

    #[test]
    fn test_error_from_data_error() {
        let err = serde_json::from_str::<u32>("\"text\"").expect_err("data");
        assert!(matches!(SdkError::from(err), SdkError::InvalidEnvelope(_)));
    }
}
