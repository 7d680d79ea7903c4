//! DHT error types

use hashmesh_protocol::{Hash, MessageType, ProtocolError};
use thiserror::Error;

/// DHT-specific errors
#[derive(Error, Debug)]
pub enum DhtError {
    #[error("No key: {}", .0.to_hex())]
    NotFound(Hash),

    #[error("No values for {meta_type} on {}", .key.to_hex())]
    MetaNotFound { key: Hash, meta_type: String },

    #[error("Key already holds a different value: {}", .0.to_hex())]
    AlreadyExists(Hash),

    #[error("Value too large: {size} bytes (max {max})")]
    ValueTooLarge { size: usize, max: usize },

    #[error("Expected {expected} body for {message_type:?}")]
    BodyTypeMismatch {
        message_type: MessageType,
        expected: &'static str,
    },

    #[error("Message type {0} not in the DHT protocol")]
    UnsupportedMessageType(u8),

    #[error("Request queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Operation timeout")]
    Timeout,

    #[error("No responsible node for key")]
    NoResponsibleNode,

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Protocol error: {0}")]
    Protocol(ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ProtocolError> for DhtError {
    fn from(err: ProtocolError) -> Self {
        // Dispatch-level protocol failures keep their own error kinds
        match err {
            ProtocolError::InvalidMessageType(t) => DhtError::UnsupportedMessageType(t),
            ProtocolError::BodyTypeMismatch {
                message_type,
                expected,
            } => DhtError::BodyTypeMismatch {
                message_type,
                expected,
            },
            other => DhtError::Protocol(other),
        }
    }
}

impl DhtError {
    /// Whether the error came from reaching the peer rather than from the peer's answer
    pub fn is_transport(&self) -> bool {
        matches!(self, DhtError::Transport(_) | DhtError::Timeout)
    }
}

/// Result type for DHT operations
pub type Result<T> = std::result::Result<T, DhtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_mapping() {
        let err: DhtError = ProtocolError::InvalidMessageType(9).into();
        assert!(matches!(err, DhtError::UnsupportedMessageType(9)));

        let err: DhtError = ProtocolError::EmptyFrame.into();
        assert!(matches!(err, DhtError::Protocol(ProtocolError::EmptyFrame)));
    }

    #[test]
    fn test_messages_name_the_key() {
        let key = Hash::from_bytes([0xaa; 32]);
        let err = DhtError::MetaNotFound {
            key,
            meta_type: "link".into(),
        };
        let text = err.to_string();
        assert!(text.contains("link"));
        assert!(text.contains(&key.to_hex()));
    }

    #[test]
    fn test_is_transport() {
        assert!(DhtError::Timeout.is_transport());
        assert!(DhtError::Transport("down".into()).is_transport());
        assert!(!DhtError::NotFound(Hash::from_bytes([0; 32])).is_transport());
    }
}
