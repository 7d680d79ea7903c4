//! Message types and the per-type wire codec

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ProtocolError, Result};
use crate::types::{Hash, Meta, NodeId};

/// Message type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Announce a hash to its responsible node (0x01)
    PutRequest = 0x01,
    /// Fetch a value and its metadata (0x02)
    GetRequest = 0x02,
    /// Fetch metadata of one type (0x03)
    GetMetaRequest = 0x03,
    /// Source validation, served by the validation protocol (0x04)
    SrcValidate = 0x04,
}

impl MessageType {
    /// Create from u8
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(MessageType::PutRequest),
            0x02 => Ok(MessageType::GetRequest),
            0x03 => Ok(MessageType::GetMetaRequest),
            0x04 => Ok(MessageType::SrcValidate),
            _ => Err(ProtocolError::InvalidMessageType(value)),
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Body shape this type must carry, if the type constrains it
    pub fn expected_body(self) -> Option<&'static str> {
        match self {
            MessageType::PutRequest | MessageType::GetRequest => Some("hash"),
            MessageType::GetMetaRequest => Some("meta query"),
            MessageType::SrcValidate => None,
        }
    }
}

/// A stored value together with the metadata attached to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPayload {
    pub hash: Hash,
    pub value: Vec<u8>,
    pub metas: Vec<Meta>,
}

/// Closed set of message body shapes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    /// A bare content address
    Hash(Hash),
    /// Metadata lookup key
    MetaQuery { hash: Hash, meta_type: String },
    /// Payload plus metadata
    Entry(EntryPayload),
    /// No body
    Empty,
}

impl MessageBody {
    /// Short name of the body shape, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::Hash(_) => "hash",
            MessageBody::MetaQuery { .. } => "meta query",
            MessageBody::Entry(_) => "entry",
            MessageBody::Empty => "empty",
        }
    }
}

/// Reply to a successfully handled request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// PUT_REQUEST accepted onto the request queue
    Queued,
    /// GET_REQUEST result
    Entry(EntryPayload),
    /// GET_META_REQUEST result
    Metas(Vec<Meta>),
}

/// A message in the HashMesh DHT protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sending node
    pub source: NodeId,

    /// Message type
    pub message_type: MessageType,

    /// Message body, shape decided by `message_type`
    pub body: MessageBody,

    /// Timestamp (Unix time in milliseconds)
    pub timestamp: u64,
}

impl Message {
    /// Create a new message stamped with the current time
    ///
    /// The body is not checked against the type here; receivers do that
    /// with [`Message::check_body`].
    pub fn new(source: NodeId, message_type: MessageType, body: MessageBody) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Message {
            source,
            message_type,
            body,
            timestamp,
        }
    }

    /// Verify that the body has the shape the message type requires
    pub fn check_body(&self) -> Result<()> {
        let Some(expected) = self.message_type.expected_body() else {
            return Ok(());
        };

        if self.body.kind() == expected {
            Ok(())
        } else {
            Err(ProtocolError::BodyTypeMismatch {
                message_type: self.message_type,
                expected,
            })
        }
    }

    /// The hash carried by the body, if it is a bare hash
    pub fn hash(&self) -> Option<&Hash> {
        match &self.body {
            MessageBody::Hash(hash) => Some(hash),
            _ => None,
        }
    }

    /// Encode: type byte followed by bincode(source, timestamp, body)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let rest = bincode::serialize(&(&self.source, self.timestamp, &self.body))
            .map_err(|e| ProtocolError::SerializationFailed(e.to_string()))?;

        let mut out = Vec::with_capacity(1 + rest.len());
        out.push(self.message_type.to_u8());
        out.extend_from_slice(&rest);
        Ok(out)
    }

    /// Decode and check the body against the declared type
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (&type_byte, rest) = bytes.split_first().ok_or(ProtocolError::EmptyFrame)?;
        let message_type = MessageType::from_u8(type_byte)?;

        let (source, timestamp, body): (NodeId, u64, MessageBody) = bincode::deserialize(rest)
            .map_err(|e| ProtocolError::DeserializationFailed(e.to_string()))?;

        let message = Message {
            source,
            message_type,
            body,
            timestamp,
        };
        message.check_body()?;
        Ok(message)
    }
}
