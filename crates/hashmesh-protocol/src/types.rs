//! Core protocol types

use blake2::{Blake2b512, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProtocolError, Result};

/// Size of a content hash in bytes (32 bytes / 256 bits)
pub const HASH_SIZE: usize = 32;

/// Size of a node ID in bytes (32 bytes / 256 bits)
pub const NODE_ID_SIZE: usize = 32;

/// XOR of two 32-byte coordinates
fn xor(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut result = [0u8; 32];
    for (i, item) in result.iter_mut().enumerate() {
        *item = a[i] ^ b[i];
    }
    result
}

/// Decode a 32-byte value from hex
fn decode_32(s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|e| ProtocolError::InvalidHash(e.to_string()))?;

    if bytes.len() != 32 {
        return Err(ProtocolError::InvalidHash(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }

    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// A content address
///
/// Equality and ordering are byte-wise, which is the same order as the
/// canonical hex encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Hash arbitrary data: BLAKE2b-512 truncated to 32 bytes
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Blake2b512::new();
        hasher.update(data);
        let out = hasher.finalize();

        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(&out[..HASH_SIZE]);
        Hash(bytes)
    }

    /// Create a Hash from a byte array
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    /// Get the bytes of this Hash
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Canonical string encoding (lowercase hex)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from the canonical hex encoding
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_32(s).map(Hash)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// A unique identifier for a node in the HashMesh network
///
/// Node IDs live in the same 256-bit space as content hashes, so the XOR
/// metric between a node and a hash decides responsibility.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct NodeId([u8; NODE_ID_SIZE]);

impl NodeId {
    /// Create a NodeId from a byte array
    pub fn from_bytes(bytes: [u8; NODE_ID_SIZE]) -> Self {
        NodeId(bytes)
    }

    /// Generate a random NodeId
    pub fn random() -> Self {
        NodeId(rand::random())
    }

    /// Get the bytes of this NodeId
    pub fn as_bytes(&self) -> &[u8; NODE_ID_SIZE] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_32(s).map(NodeId)
    }

    /// Calculate XOR distance between two node IDs
    pub fn distance(&self, other: &NodeId) -> [u8; NODE_ID_SIZE] {
        xor(&self.0, &other.0)
    }

    /// Calculate XOR distance from this node to a content hash
    pub fn distance_to_hash(&self, hash: &Hash) -> [u8; NODE_ID_SIZE] {
        xor(&self.0, &hash.0)
    }
}

impl From<Hash> for NodeId {
    fn from(hash: Hash) -> Self {
        NodeId(hash.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.to_hex())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// A typed, immutable annotation attached to a stored hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Hash the annotation points at
    pub target: Hash,

    /// Type tag, e.g. "link"
    pub meta_type: String,

    /// Opaque value
    pub value: Vec<u8>,
}

impl Meta {
    pub fn new(target: Hash, meta_type: impl Into<String>, value: Vec<u8>) -> Self {
        Meta {
            target,
            meta_type: meta_type.into(),
            value,
        }
    }
}
