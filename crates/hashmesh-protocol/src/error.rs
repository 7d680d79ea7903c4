//! Error types for protocol operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("Body does not match message type {message_type:?}: expected {expected}")]
    BodyTypeMismatch {
        message_type: crate::MessageType,
        expected: &'static str,
    },

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),
}
