//! Peer information for the DHT routing table

use hashmesh_protocol::{Hash, NodeId};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp
fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Information about a known peer
#[derive(Debug, Clone)]
pub struct NodeInfo {
    /// Peer identifier, also its address on the transport
    pub node_id: NodeId,

    /// Last successful communication (Unix timestamp)
    pub last_seen: u64,

    /// First seen timestamp
    pub first_seen: u64,

    /// Consecutive failures
    pub failures: u32,

    /// Total successful communications
    pub total_successes: u64,
}

impl NodeInfo {
    /// Create new node info
    pub fn new(node_id: NodeId) -> Self {
        let now = now();
        NodeInfo {
            node_id,
            last_seen: now,
            first_seen: now,
            failures: 0,
            total_successes: 0,
        }
    }

    /// Record successful communication
    pub fn record_success(&mut self) {
        self.last_seen = now();
        self.failures = 0;
        self.total_successes += 1;
    }

    /// Record failed communication
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Check if node is likely stale
    pub fn is_stale(&self, max_age_secs: u64) -> bool {
        let age = now().saturating_sub(self.last_seen);
        age > max_age_secs
    }

    /// Check if node should be evicted
    pub fn should_evict(&self, max_failures: u32, max_age_secs: u64) -> bool {
        self.failures >= max_failures || self.is_stale(max_age_secs)
    }

    /// XOR distance from this peer to a content hash
    pub fn distance_to_hash(&self, hash: &Hash) -> [u8; 32] {
        self.node_id.distance_to_hash(hash)
    }
}
