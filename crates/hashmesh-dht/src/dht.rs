//! DHT orchestrator
//!
//! Owns the local store and request queue, registers the protocol receiver
//! with the transport, and drives outbound put/get requests.

use crate::config::DhtConfig;
use crate::error::{DhtError, Result};
use crate::locator::{NodeLocator, SelfLocator, XorDistanceLocator};
use crate::queue::RequestQueue;
use crate::receiver::{DhtContext, ProtocolReceiver};
use crate::routing_table::RoutingTable;
use crate::storage::LocalStore;
use crate::transport::MessageTransport;
use hashmesh_protocol::{
    EntryPayload, Hash, Message, MessageBody, MessageType, Meta, NodeId, Response,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// One node's share of the distributed hash table
pub struct Dht {
    node_id: NodeId,
    config: DhtConfig,
    ctx: DhtContext,
    locator: Arc<dyn NodeLocator>,
    transport: Arc<dyn MessageTransport>,
    started: AtomicBool,
}

impl Dht {
    /// Create a DHT with an explicit routing strategy
    pub fn new(
        config: DhtConfig,
        transport: Arc<dyn MessageTransport>,
        locator: Arc<dyn NodeLocator>,
    ) -> Result<Self> {
        config.validate()?;

        let ctx = DhtContext {
            store: Arc::new(RwLock::new(LocalStore::with_policy(
                config.overwrite_policy,
                config.max_value_size,
            ))),
            queue: Arc::new(RequestQueue::new(config.queue_capacity)),
        };

        Ok(Dht {
            node_id: transport.local_id(),
            config,
            ctx,
            locator,
            transport,
            started: AtomicBool::new(false),
        })
    }

    /// Create a single-node DHT responsible for every hash
    pub fn with_self_locator(
        config: DhtConfig,
        transport: Arc<dyn MessageTransport>,
    ) -> Result<Self> {
        let locator = Arc::new(SelfLocator::new(transport.local_id()));
        Self::new(config, transport, locator)
    }

    /// Create a DHT that routes by XOR distance over `routing_table`
    ///
    /// Each hash is announced to `config.replication_factor` nodes.
    pub fn with_xor_locator(
        config: DhtConfig,
        transport: Arc<dyn MessageTransport>,
        routing_table: Arc<RwLock<RoutingTable>>,
    ) -> Result<Self> {
        let locator = Arc::new(XorDistanceLocator::new(
            transport.local_id(),
            routing_table,
            config.replication_factor,
        ));
        Self::new(config, transport, locator)
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn config(&self) -> &DhtConfig {
        &self.config
    }

    /// Pending inbound put requests
    pub fn queue(&self) -> &Arc<RequestQueue> {
        &self.ctx.queue
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Start listening for DHT protocol messages
    ///
    /// Calling this again is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("DHT on {} already started", self.node_id);
            return Ok(());
        }

        let receiver = Arc::new(ProtocolReceiver::new(self.ctx.clone()));
        if let Err(e) = self
            .transport
            .start_protocol(&self.config.protocol_id, receiver)
            .await
        {
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }

        info!(
            "DHT started on {} (protocol {})",
            self.node_id, self.config.protocol_id
        );
        Ok(())
    }

    /// Stop accepting inbound put requests; queued ones can still drain
    pub fn shutdown(&self) {
        self.ctx.queue.close();
        info!("DHT on {} shut down", self.node_id);
    }

    /// Send a message to a peer and await the reply, bounded by the request timeout
    pub async fn send(
        &self,
        to: &NodeId,
        message_type: MessageType,
        body: MessageBody,
    ) -> Result<Response> {
        let message = Message::new(self.node_id, message_type, body);
        let request = self.transport.send(&self.config.protocol_id, to, message);

        match timeout(self.config.request_timeout(), request).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "{:?} to {} timed out after {}ms",
                    message_type, to, self.config.request_timeout_ms
                );
                Err(DhtError::Timeout)
            }
        }
    }

    /// Announce a hash to the nodes responsible for it
    ///
    /// Only the hash travels; responsible nodes pull the value back from us
    /// and validate it themselves. Nothing is written locally. Returns the
    /// number of nodes that acknowledged.
    pub async fn send_put(&self, key: Hash) -> Result<usize> {
        let nodes = self.locator.find_responsible(&key).await?;
        debug!("Announcing {} to {} node(s)", key, nodes.len());

        let requests = nodes
            .iter()
            .map(|node| self.send(node, MessageType::PutRequest, MessageBody::Hash(key)));
        let results = futures::future::join_all(requests).await;

        let mut acked = 0;
        let mut first_error = None;

        for (node, result) in nodes.iter().zip(results) {
            match result {
                Ok(Response::Queued) => {
                    acked += 1;
                    self.locator.mark_reachable(node).await;
                }
                Ok(other) => {
                    warn!("Unexpected reply to PUT_REQUEST from {}: {:?}", node, other);
                    first_error.get_or_insert(DhtError::UnexpectedResponse(format!(
                        "expected acknowledgement, got {:?}",
                        other
                    )));
                }
                Err(e) => {
                    warn!("PUT_REQUEST for {} to {} failed: {}", key, node, e);
                    if e.is_transport() {
                        self.locator.mark_unreachable(node).await;
                    }
                    first_error.get_or_insert(e);
                }
            }
        }

        if acked == 0 {
            return Err(first_error.unwrap_or(DhtError::NoResponsibleNode));
        }
        Ok(acked)
    }

    /// Fetch a value and its metadata from one specific node
    pub async fn fetch_entry(&self, from: &NodeId, key: Hash) -> Result<EntryPayload> {
        match self
            .send(from, MessageType::GetRequest, MessageBody::Hash(key))
            .await?
        {
            Response::Entry(entry) => Ok(entry),
            other => Err(DhtError::UnexpectedResponse(format!(
                "expected entry, got {:?}",
                other
            ))),
        }
    }

    /// Look a hash up locally, then on the nodes responsible for it
    pub async fn send_get(&self, key: Hash) -> Result<EntryPayload> {
        if let Ok(entry) = self.ctx.store.read().await.entry(&key) {
            return Ok(entry);
        }

        let nodes = self.locator.find_responsible(&key).await?;
        let mut last_error = DhtError::NotFound(key);

        for node in nodes.iter().filter(|n| **n != self.node_id) {
            match self.fetch_entry(node, key).await {
                Ok(entry) => return Ok(entry),
                Err(e) => {
                    debug!("GET_REQUEST for {} to {} failed: {}", key, node, e);
                    if e.is_transport() {
                        self.locator.mark_unreachable(node).await;
                    }
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// Fetch metadata of one type from the first responsible node that has it
    pub async fn send_get_meta(&self, key: Hash, meta_type: &str) -> Result<Vec<Meta>> {
        let nodes = self.locator.find_responsible(&key).await?;
        let mut last_error = DhtError::NotFound(key);

        for node in &nodes {
            let body = MessageBody::MetaQuery {
                hash: key,
                meta_type: meta_type.to_string(),
            };
            match self.send(node, MessageType::GetMetaRequest, body).await {
                Ok(Response::Metas(metas)) => return Ok(metas),
                Ok(other) => {
                    last_error =
                        DhtError::UnexpectedResponse(format!("expected metas, got {:?}", other));
                }
                Err(e) => {
                    debug!("GET_META_REQUEST for {} to {} failed: {}", key, node, e);
                    if e.is_transport() {
                        self.locator.mark_unreachable(node).await;
                    }
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    // Local API. Callers hand in data that is already validated.

    /// Store a value
    pub async fn put(&self, key: Hash, value: Vec<u8>) -> Result<()> {
        self.ctx.store.write().await.put(key, value)?;
        Ok(())
    }

    pub async fn exists(&self, key: &Hash) -> bool {
        self.ctx.store.read().await.exists(key)
    }

    /// Retrieve a stored value
    pub async fn get(&self, key: &Hash) -> Result<Vec<u8>> {
        self.ctx.store.read().await.get(key).map(<[u8]>::to_vec)
    }

    /// Attach metadata to a stored hash
    pub async fn put_meta(
        &self,
        key: Hash,
        meta_key: Hash,
        meta_type: &str,
        value: Vec<u8>,
    ) -> Result<()> {
        self.ctx
            .store
            .write()
            .await
            .put_meta(key, meta_key, meta_type, value)
    }

    /// Metadata of one type, in insertion order
    pub async fn get_meta(&self, key: &Hash, meta_type: &str) -> Result<Vec<Meta>> {
        self.ctx.store.read().await.get_meta(key, meta_type)
    }

    /// Store a pulled entry and whatever metadata we do not hold yet
    ///
    /// Each pulled meta is matched against at most one meta held before the
    /// pull, so repeated metas in the payload are kept as repeated. Both
    /// writes happen under one write lock. Returns the number of metas added.
    pub async fn store_entry(&self, entry: EntryPayload) -> Result<usize> {
        let mut store = self.ctx.store.write().await;
        store.put(entry.hash, entry.value)?;

        let mut held = store.all_meta(&entry.hash).to_vec();
        let mut added = 0;
        for meta in entry.metas {
            if let Some(pos) = held.iter().position(|m| *m == meta) {
                held.swap_remove(pos);
                continue;
            }
            store.put_meta(entry.hash, meta.target, &meta.meta_type, meta.value)?;
            added += 1;
        }

        Ok(added)
    }
}
