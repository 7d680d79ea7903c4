//! K-bucket of peers at one XOR distance range

use crate::node_info::NodeInfo;
use crate::{K, MAX_FAILURES, STALE_AFTER_SECS};
use hashmesh_protocol::NodeId;
use std::collections::VecDeque;

/// A k-bucket for storing nodes at a specific distance
#[derive(Debug, Clone)]
pub struct KBucket {
    /// Bucket index (0-255)
    pub index: usize,

    /// Nodes in this bucket, least recently seen first
    nodes: VecDeque<NodeInfo>,

    /// Replacement cache for when bucket is full
    replacement_cache: VecDeque<NodeInfo>,

    /// Last time this bucket was updated
    pub last_updated: u64,
}

impl KBucket {
    /// Create a new k-bucket
    pub fn new(index: usize) -> Self {
        KBucket {
            index,
            nodes: VecDeque::with_capacity(K),
            replacement_cache: VecDeque::new(),
            last_updated: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.nodes.len() >= K
    }

    pub fn nodes(&self) -> &VecDeque<NodeInfo> {
        &self.nodes
    }

    pub fn find_node(&self, node_id: &NodeId) -> Option<&NodeInfo> {
        self.nodes.iter().find(|n| &n.node_id == node_id)
    }

    pub fn find_node_mut(&mut self, node_id: &NodeId) -> Option<&mut NodeInfo> {
        self.nodes.iter_mut().find(|n| &n.node_id == node_id)
    }

    /// Add or update a node in the bucket
    ///
    /// Returns true if the node is now in the bucket, false if it only went
    /// to the replacement cache.
    pub fn add_or_update(&mut self, node: NodeInfo, current_time: u64) -> bool {
        let node_id = node.node_id;

        // Known node moves to the back (most recently seen)
        if let Some(pos) = self.nodes.iter().position(|n| n.node_id == node_id) {
            self.nodes.remove(pos);
            self.nodes.push_back(node);
            self.last_updated = current_time;
            return true;
        }

        if !self.is_full() {
            self.nodes.push_back(node);
            self.last_updated = current_time;
            return true;
        }

        // Full: replace the head only if it has gone bad
        let head_is_bad = self
            .nodes
            .front()
            .map(|head| head.should_evict(MAX_FAILURES, STALE_AFTER_SECS))
            .unwrap_or(false);

        if head_is_bad {
            self.nodes.pop_front();
            self.nodes.push_back(node);
            self.last_updated = current_time;
            return true;
        }

        self.add_to_replacement_cache(node);
        false
    }

    fn add_to_replacement_cache(&mut self, node: NodeInfo) {
        let node_id = node.node_id;

        if let Some(pos) = self
            .replacement_cache
            .iter()
            .position(|n| n.node_id == node_id)
        {
            self.replacement_cache.remove(pos);
        }

        self.replacement_cache.push_back(node);

        if self.replacement_cache.len() > K {
            self.replacement_cache.pop_front();
        }
    }

    /// Remove a node, promoting a replacement if one is cached
    pub fn remove(&mut self, node_id: &NodeId) -> Option<NodeInfo> {
        let pos = self.nodes.iter().position(|n| &n.node_id == node_id)?;
        let removed = self.nodes.remove(pos);

        if let Some(replacement) = self.replacement_cache.pop_back() {
            self.nodes.push_back(replacement);
        }

        removed
    }

    /// Remove stale nodes, returning how many left the bucket
    pub fn prune_stale(&mut self, max_age_secs: u64) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|node| !node.is_stale(max_age_secs));
        let removed = before - self.nodes.len();

        while !self.is_full() {
            match self.replacement_cache.pop_back() {
                Some(replacement) => self.nodes.push_back(replacement),
                None => break,
            }
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_node(id: u8) -> NodeInfo {
        NodeInfo::new(NodeId::from_bytes([id; 32]))
    }

    #[test]
    fn test_empty_bucket() {
        let bucket = KBucket::new(0);
        assert!(bucket.is_empty());
        assert!(!bucket.is_full());
        assert_eq!(bucket.len(), 0);
    }

    #[test]
    fn test_update_existing_node() {
        let mut bucket = KBucket::new(0);
        bucket.add_or_update(create_test_node(1), 0);
        bucket.add_or_update(create_test_node(2), 0);
        bucket.add_or_update(create_test_node(1), 1);

        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket.last_updated, 1);
        // Re-seen node is now the most recent
        assert_eq!(
            bucket.nodes().back().unwrap().node_id,
            NodeId::from_bytes([1; 32])
        );
    }

    #[test]
    fn test_full_bucket_uses_replacement_cache() {
        let mut bucket = KBucket::new(0);
        for i in 0..K {
            assert!(bucket.add_or_update(create_test_node(i as u8), 0));
        }
        assert!(bucket.is_full());

        assert!(!bucket.add_or_update(create_test_node(99), 0));
        assert!(bucket.find_node(&NodeId::from_bytes([99; 32])).is_none());

        let first = bucket.nodes().front().unwrap().node_id;
        bucket.remove(&first);
        assert_eq!(bucket.len(), K);
        assert!(bucket.find_node(&NodeId::from_bytes([99; 32])).is_some());

        // Cache is used up
        let second = bucket.nodes().front().unwrap().node_id;
        bucket.remove(&second);
        assert_eq!(bucket.len(), K - 1);
    }

    #[test]
    fn test_failing_head_is_replaced() {
        let mut bucket = KBucket::new(0);
        for i in 0..K {
            bucket.add_or_update(create_test_node(i as u8), 0);
        }

        let head = bucket.nodes().front().unwrap().node_id;
        let head_info = bucket.find_node_mut(&head).unwrap();
        for _ in 0..MAX_FAILURES {
            head_info.record_failure();
        }

        assert!(bucket.add_or_update(create_test_node(99), 1));
        assert!(bucket.find_node(&head).is_none());
        assert_eq!(bucket.len(), K);
    }

    #[test]
    fn test_prune_stale() {
        let mut bucket = KBucket::new(0);

        let mut old_node = create_test_node(1);
        old_node.last_seen = 0;
        bucket.add_or_update(old_node, 0);
        bucket.add_or_update(create_test_node(2), 10000);

        assert_eq!(bucket.prune_stale(3600), 1);
        assert_eq!(bucket.len(), 1);
    }
}
