use thiserror::Error;

use crate::models::ErrorKind;

#[derive(Debug, Error)]
pub enum AdGenError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// Shown to the user as-is, so the message carries no prefix.
    #[error("{0}")]
    InvalidInput(String),
    #[error("Request error: {0}")]
    RequestError(String),
    #[error("Response error: {0}")]
    ResponseError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AdGenError {
    /// Failure kind reported to callers of `submit` for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdGenError::InvalidInput(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::TransportError,
        }
    }
}

impl From<serde_json::Error> for AdGenError {
    fn from(err: serde_json::Error) -> Self {
        AdGenError::ResponseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AdGenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_message_is_unprefixed() {
        let err = AdGenError::InvalidInput("Please upload an image first.".into());
        assert_eq!(err.to_string(), "Please upload an image first.");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_everything_else_is_a_transport_error() {
        let err: AdGenError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, AdGenError::ResponseError(_)));
        assert_eq!(err.kind(), ErrorKind::TransportError);
        assert_eq!(
            AdGenError::RequestError("connection refused".into()).kind(),
            ErrorKind::TransportError
        );
    }
}
