//! Kademlia routing table: the known peer set

use crate::kbucket::KBucket;
use crate::node_info::NodeInfo;
use crate::MAX_FAILURES;
use hashmesh_protocol::{Hash, NodeId};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp
fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Kademlia routing table
#[derive(Debug, Clone)]
pub struct RoutingTable {
    /// Our local node ID
    local_node_id: NodeId,

    /// 256 k-buckets (one per bit of node ID distance)
    buckets: Vec<KBucket>,
}

impl RoutingTable {
    /// Create a new routing table
    pub fn new(local_node_id: NodeId) -> Self {
        RoutingTable {
            local_node_id,
            buckets: (0..256).map(KBucket::new).collect(),
        }
    }

    pub fn local_node_id(&self) -> &NodeId {
        &self.local_node_id
    }

    /// Total number of nodes in the table
    pub fn node_count(&self) -> usize {
        self.buckets.iter().map(KBucket::len).sum()
    }

    /// Bucket index is the position of the most significant differing bit
    fn bucket_index(&self, node_id: &NodeId) -> usize {
        let distance = self.local_node_id.distance(node_id);

        for (byte_idx, &byte) in distance.iter().enumerate() {
            if byte != 0 {
                return byte_idx * 8 + byte.leading_zeros() as usize;
            }
        }

        // Only our own id has zero distance, and we never store it
        255
    }

    /// Add or update a node
    ///
    /// Returns false if the node only made it into a replacement cache.
    pub fn add_or_update(&mut self, node: NodeInfo) -> bool {
        if node.node_id == self.local_node_id {
            return false;
        }

        let bucket_idx = self.bucket_index(&node.node_id);
        self.buckets[bucket_idx].add_or_update(node, now())
    }

    pub fn find_node(&self, node_id: &NodeId) -> Option<&NodeInfo> {
        if node_id == &self.local_node_id {
            return None;
        }

        self.buckets[self.bucket_index(node_id)].find_node(node_id)
    }

    pub fn remove(&mut self, node_id: &NodeId) -> Option<NodeInfo> {
        let bucket_idx = self.bucket_index(node_id);
        self.buckets[bucket_idx].remove(node_id)
    }

    /// Record a successful exchange with a peer
    pub fn record_success(&mut self, node_id: &NodeId) {
        let bucket_idx = self.bucket_index(node_id);
        if let Some(node) = self.buckets[bucket_idx].find_node_mut(node_id) {
            node.record_success();
        }
    }

    /// Record a failed exchange; evicts the peer after repeated failures
    ///
    /// Returns true if the peer was evicted.
    pub fn record_failure(&mut self, node_id: &NodeId) -> bool {
        let bucket_idx = self.bucket_index(node_id);
        let bucket = &mut self.buckets[bucket_idx];

        let evict = match bucket.find_node_mut(node_id) {
            Some(node) => {
                node.record_failure();
                node.failures >= MAX_FAILURES
            }
            None => false,
        };

        if evict {
            bucket.remove(node_id);
        }
        evict
    }

    /// Get the k nodes closest to a content hash, closest first
    ///
    /// Ties cannot happen between distinct ids, so the order is total.
    pub fn get_k_closest(&self, target: &Hash, k: usize) -> Vec<NodeInfo> {
        let mut all_nodes = self.get_all_nodes();
        all_nodes.sort_by_key(|node| node.distance_to_hash(target));
        all_nodes.truncate(k);
        all_nodes
    }

    /// Prune stale nodes from all buckets
    pub fn prune_stale(&mut self, max_age_secs: u64) -> usize {
        self.buckets
            .iter_mut()
            .map(|bucket| bucket.prune_stale(max_age_secs))
            .sum()
    }

    pub fn get_all_nodes(&self) -> Vec<NodeInfo> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.nodes().iter().cloned())
            .collect()
    }
}
