//! Responsible-node lookup strategies

use crate::error::{DhtError, Result};
use crate::node_info::NodeInfo;
use crate::routing_table::RoutingTable;
use crate::{K, STALE_AFTER_SECS};
use async_trait::async_trait;
use hashmesh_protocol::{Hash, NodeId};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Decides which nodes hold the canonical copy of a hash
#[async_trait]
pub trait NodeLocator: Send + Sync {
    /// Nodes responsible for `key`, closest first; never empty on success
    async fn find_responsible(&self, key: &Hash) -> Result<Vec<NodeId>>;

    /// Feedback that a node could not be reached
    async fn mark_unreachable(&self, _node: &NodeId) {}

    /// Feedback that a node answered
    async fn mark_reachable(&self, _node: &NodeId) {}
}

/// Degenerate single-node routing: every hash belongs to us
#[derive(Debug, Clone)]
pub struct SelfLocator {
    local: NodeId,
}

impl SelfLocator {
    pub fn new(local: NodeId) -> Self {
        SelfLocator { local }
    }
}

#[async_trait]
impl NodeLocator for SelfLocator {
    async fn find_responsible(&self, _key: &Hash) -> Result<Vec<NodeId>> {
        Ok(vec![self.local])
    }
}

/// XOR-distance routing over the known peer set
///
/// The local node competes with its peers, so a node with no peers is
/// responsible for everything.
pub struct XorDistanceLocator {
    local: NodeId,
    routing_table: Arc<RwLock<RoutingTable>>,
    replication_factor: usize,
}

impl XorDistanceLocator {
    pub fn new(
        local: NodeId,
        routing_table: Arc<RwLock<RoutingTable>>,
        replication_factor: usize,
    ) -> Self {
        XorDistanceLocator {
            local,
            routing_table,
            replication_factor: replication_factor.max(1),
        }
    }

    pub fn routing_table(&self) -> &Arc<RwLock<RoutingTable>> {
        &self.routing_table
    }

    /// Add a peer to the candidate set
    pub async fn add_peer(&self, node_id: NodeId) -> bool {
        self.routing_table
            .write()
            .await
            .add_or_update(NodeInfo::new(node_id))
    }

    /// Drop peers not heard from within `STALE_AFTER_SECS`
    pub async fn prune_stale(&self) -> usize {
        let pruned = self
            .routing_table
            .write()
            .await
            .prune_stale(STALE_AFTER_SECS);
        if pruned > 0 {
            info!("Pruned {} stale peer(s)", pruned);
        }
        pruned
    }
}

#[async_trait]
impl NodeLocator for XorDistanceLocator {
    async fn find_responsible(&self, key: &Hash) -> Result<Vec<NodeId>> {
        let mut candidates: Vec<NodeId> = {
            let rt = self.routing_table.read().await;
            rt.get_k_closest(key, K.max(self.replication_factor))
                .into_iter()
                .map(|n| n.node_id)
                .collect()
        };
        candidates.push(self.local);

        candidates.sort_by_key(|id| id.distance_to_hash(key));
        candidates.dedup();
        candidates.truncate(self.replication_factor);

        if candidates.is_empty() {
            return Err(DhtError::NoResponsibleNode);
        }

        debug!(
            "Responsible for {}: {:?}",
            key,
            candidates.iter().map(|n| n.to_string()).collect::<Vec<_>>()
        );
        Ok(candidates)
    }

    async fn mark_unreachable(&self, node: &NodeId) {
        if self.routing_table.write().await.record_failure(node) {
            info!("Evicted unreachable peer {}", node);
        }
        // Also sweep peers that went silent
        self.prune_stale().await;
    }

    async fn mark_reachable(&self, node: &NodeId) {
        self.routing_table.write().await.record_success(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_FAILURES;

    fn id(b: u8) -> NodeId {
        NodeId::from_bytes([b; 32])
    }

    fn locator(local: u8, peers: &[u8], r: usize) -> XorDistanceLocator {
        let mut table = RoutingTable::new(id(local));
        for &p in peers {
            table.add_or_update(NodeInfo::new(id(p)));
        }
        XorDistanceLocator::new(id(local), Arc::new(RwLock::new(table)), r)
    }

    #[tokio::test]
    async fn test_self_locator() {
        let locator = SelfLocator::new(id(9));
        let nodes = locator.find_responsible(&Hash::digest(b"A")).await.unwrap();
        assert_eq!(nodes, vec![id(9)]);
    }

    #[tokio::test]
    async fn test_no_peers_means_self() {
        let locator = locator(1, &[], 3);
        let nodes = locator.find_responsible(&Hash::digest(b"A")).await.unwrap();
        assert_eq!(nodes, vec![id(1)]);
    }

    #[tokio::test]
    async fn test_closest_peer_wins() {
        let locator = locator(0x10, &[0x01, 0x20, 0x0e], 1);

        let key = Hash::from_bytes([0x0f; 32]);
        assert_eq!(locator.find_responsible(&key).await.unwrap(), vec![id(0x0e)]);

        let key = Hash::from_bytes([0x11; 32]);
        assert_eq!(locator.find_responsible(&key).await.unwrap(), vec![id(0x10)]);
    }

    #[tokio::test]
    async fn test_replication_factor() {
        let locator = locator(0x80, &[0x01, 0x02, 0x03, 0x40], 3);
        let key = Hash::from_bytes([0x00; 32]);

        let nodes = locator.find_responsible(&key).await.unwrap();
        assert_eq!(nodes, vec![id(0x01), id(0x02), id(0x03)]);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let a = locator(0x80, &[0x01, 0x02, 0x03, 0x40], 2);
        let b = locator(0x80, &[0x40, 0x03, 0x02, 0x01], 2);

        for i in 0..20u8 {
            let key = Hash::digest(&[i]);
            assert_eq!(
                a.find_responsible(&key).await.unwrap(),
                b.find_responsible(&key).await.unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_dropped() {
        let locator = locator(0x80, &[0x01], 1);
        let key = Hash::from_bytes([0x00; 32]);
        assert_eq!(locator.find_responsible(&key).await.unwrap(), vec![id(0x01)]);

        for _ in 0..MAX_FAILURES {
            locator.mark_unreachable(&id(0x01)).await;
        }

        assert_eq!(locator.find_responsible(&key).await.unwrap(), vec![id(0x80)]);
    }

    #[tokio::test]
    async fn test_stale_peers_pruned_on_failure() {
        let locator = locator(0x80, &[0x40], 1);
        let mut stale = NodeInfo::new(id(0x01));
        stale.last_seen = 0;
        locator.routing_table().write().await.add_or_update(stale);

        let key = Hash::from_bytes([0x00; 32]);
        assert_eq!(locator.find_responsible(&key).await.unwrap(), vec![id(0x01)]);

        locator.mark_unreachable(&id(0x40)).await;

        assert_eq!(locator.find_responsible(&key).await.unwrap(), vec![id(0x40)]);
        assert_eq!(locator.routing_table().read().await.node_count(), 1);
    }

    #[tokio::test]
    async fn test_prune_stale() {
        let locator = locator(0x80, &[0x40, 0x41], 1);
        assert_eq!(locator.prune_stale().await, 0);

        let mut stale = NodeInfo::new(id(0x01));
        stale.last_seen = 0;
        locator.routing_table().write().await.add_or_update(stale);

        assert_eq!(locator.prune_stale().await, 1);
        let table = locator.routing_table().read().await;
        assert!(table.find_node(&id(0x01)).is_none());
    }

    #[tokio::test]
    async fn test_add_peer() {
        let locator = locator(0x80, &[], 1);
        assert!(locator.add_peer(id(0x01)).await);
        assert!(!locator.add_peer(id(0x80)).await);
        assert_eq!(locator.routing_table().read().await.node_count(), 1);
    }
}
