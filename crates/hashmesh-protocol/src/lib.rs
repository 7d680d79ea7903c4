//! HashMesh Protocol Module
//!
//! Content addresses, node identities and the message formats exchanged by
//! the HashMesh DHT protocol.

pub mod error;
pub mod message;
pub mod types;

pub use error::{ProtocolError, Result};
pub use message::{EntryPayload, Message, MessageBody, MessageType, Response};
pub use types::{Hash, Meta, NodeId};
