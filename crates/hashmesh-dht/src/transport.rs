//! Transport abstraction for DHT messages
//!
//! The DHT only needs request/response delivery to a peer and a way to
//! register its receiver under a protocol identifier. `MemoryNetwork`
//! provides both in-process.

use crate::error::{DhtError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use hashmesh_protocol::{Message, NodeId, Response};
use std::sync::Arc;
use tracing::debug;

/// Handler for inbound messages of one protocol
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// Handle a message and produce the reply
    async fn handle(&self, message: Message) -> Result<Response>;
}

/// Request/response delivery between peers
///
/// Implementations report connection failures as `DhtError::Transport`.
/// Timeouts are applied by the caller, so `send` may wait indefinitely.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Identity of the node this transport belongs to
    fn local_id(&self) -> NodeId;

    /// Deliver a message to a peer and await its reply
    async fn send(&self, protocol: &str, to: &NodeId, message: Message) -> Result<Response>;

    /// Register a handler for inbound messages of `protocol`
    ///
    /// Registering again replaces the previous handler.
    async fn start_protocol(&self, protocol: &str, handler: Arc<dyn ProtocolHandler>)
        -> Result<()>;
}

type HandlerTable = DashMap<String, Arc<dyn ProtocolHandler>>;

/// In-process network connecting `MemoryTransport`s
#[derive(Default)]
pub struct MemoryNetwork {
    nodes: DashMap<NodeId, Arc<HandlerTable>>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a node and get its transport
    pub fn connect(self: &Arc<Self>, node_id: NodeId) -> Arc<MemoryTransport> {
        self.nodes.entry(node_id).or_default();

        Arc::new(MemoryTransport {
            local_id: node_id,
            network: Arc::clone(self),
        })
    }

    /// Detach a node; messages to it fail from now on
    pub fn disconnect(&self, node_id: &NodeId) {
        self.nodes.remove(node_id);
    }

    pub fn is_connected(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn handler(&self, to: &NodeId, protocol: &str) -> Result<Arc<dyn ProtocolHandler>> {
        let table = self
            .nodes
            .get(to)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DhtError::Transport(format!("peer {} unreachable", to)))?;

        let handler = table
            .get(protocol)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                DhtError::Transport(format!("peer {} does not speak {}", to, protocol))
            })?;

        Ok(handler)
    }
}

/// One node's view of a `MemoryNetwork`
pub struct MemoryTransport {
    local_id: NodeId,
    network: Arc<MemoryNetwork>,
}

impl MemoryTransport {
    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }
}

#[async_trait]
impl MessageTransport for MemoryTransport {
    fn local_id(&self) -> NodeId {
        self.local_id
    }

    async fn send(&self, protocol: &str, to: &NodeId, message: Message) -> Result<Response> {
        if !self.network.is_connected(&self.local_id) {
            return Err(DhtError::Transport("local node disconnected".into()));
        }

        // Dashmap guards are released before the handler runs
        let handler = self.network.handler(to, protocol)?;

        debug!(
            "Delivering {:?} from {} to {}",
            message.message_type, self.local_id, to
        );
        handler.handle(message).await
    }

    async fn start_protocol(
        &self,
        protocol: &str,
        handler: Arc<dyn ProtocolHandler>,
    ) -> Result<()> {
        let table = self
            .network
            .nodes
            .get(&self.local_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DhtError::Transport("local node disconnected".into()))?;

        table.insert(protocol.to_string(), handler);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashmesh_protocol::{Hash, MessageBody, MessageType};

    struct Echo;

    #[async_trait]
    impl ProtocolHandler for Echo {
        async fn handle(&self, message: Message) -> Result<Response> {
            match message.body {
                MessageBody::Hash(_) => Ok(Response::Queued),
                _ => Err(DhtError::UnexpectedResponse("echo".into())),
            }
        }
    }

    fn put(from: NodeId) -> Message {
        Message::new(
            from,
            MessageType::PutRequest,
            MessageBody::Hash(Hash::digest(b"A")),
        )
    }

    #[tokio::test]
    async fn test_send_to_registered_handler() {
        let network = MemoryNetwork::new();
        let a = network.connect(NodeId::from_bytes([1; 32]));
        let b = network.connect(NodeId::from_bytes([2; 32]));

        b.start_protocol("test/1", Arc::new(Echo)).await.unwrap();

        let response = a.send("test/1", &b.local_id(), put(a.local_id())).await;
        assert_eq!(response.unwrap(), Response::Queued);
        assert_eq!(network.node_count(), 2);
    }

    #[tokio::test]
    async fn test_send_to_self() {
        let network = MemoryNetwork::new();
        let a = network.connect(NodeId::from_bytes([1; 32]));
        a.start_protocol("test/1", Arc::new(Echo)).await.unwrap();

        let response = a.send("test/1", &a.local_id(), put(a.local_id())).await;
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_protocol() {
        let network = MemoryNetwork::new();
        let a = network.connect(NodeId::from_bytes([1; 32]));
        let b = network.connect(NodeId::from_bytes([2; 32]));

        let result = a.send("test/1", &b.local_id(), put(a.local_id())).await;
        assert!(matches!(result, Err(DhtError::Transport(_))));
    }

    #[tokio::test]
    async fn test_disconnected_peer() {
        let network = MemoryNetwork::new();
        let a = network.connect(NodeId::from_bytes([1; 32]));
        let b = network.connect(NodeId::from_bytes([2; 32]));
        b.start_protocol("test/1", Arc::new(Echo)).await.unwrap();

        network.disconnect(&b.local_id());

        let result = a.send("test/1", &b.local_id(), put(a.local_id())).await;
        assert!(matches!(result, Err(DhtError::Transport(_))));
    }

    #[tokio::test]
    async fn test_handler_errors_pass_through() {
        let network = MemoryNetwork::new();
        let a = network.connect(NodeId::from_bytes([1; 32]));
        a.start_protocol("test/1", Arc::new(Echo)).await.unwrap();

        let message = Message::new(a.local_id(), MessageType::PutRequest, MessageBody::Empty);
        let result = a.send("test/1", &a.local_id(), message).await;
        assert!(matches!(result, Err(DhtError::UnexpectedResponse(_))));
    }
}
