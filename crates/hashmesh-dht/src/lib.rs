//! HashMesh DHT (Distributed Hash Table)
//!
//! Storage core of a content-addressed peer-to-peer network:
//! - Local content and metadata storage
//! - Announce/pull put flow through a bounded request queue
//! - Responsible-node lookup by XOR distance
//! - Pluggable request/response transport

pub mod config;
pub mod dht;
pub mod error;
pub mod kbucket;
pub mod locator;
pub mod node_info;
pub mod queue;
pub mod receiver;
pub mod routing_table;
pub mod storage;
pub mod transport;
pub mod worker;

pub use config::{DhtConfig, OverwritePolicy};
pub use dht::Dht;
pub use error::{DhtError, Result};
pub use kbucket::KBucket;
pub use locator::{NodeLocator, SelfLocator, XorDistanceLocator};
pub use node_info::NodeInfo;
pub use queue::{QueuedRequest, RequestQueue};
pub use receiver::{DhtContext, ProtocolReceiver};
pub use routing_table::RoutingTable;
pub use storage::{ContentStore, LocalStore, MetadataStore};
pub use transport::{MemoryNetwork, MemoryTransport, MessageTransport, ProtocolHandler};
pub use worker::{AcceptAll, ContentHashValidator, EntryValidator, PutOutcome, PutWorker};

/// Protocol identifier the receiver registers under
pub const PROTOCOL_ID: &str = "hashmesh/dht/0.1";

/// Kademlia k parameter (nodes per k-bucket)
pub const K: usize = 20;

/// Maximum value size (bytes)
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1MB

/// Consecutive failures before a peer is evicted
pub const MAX_FAILURES: u32 = 5;

/// Seconds without contact before a peer counts as stale
pub const STALE_AFTER_SECS: u64 = 3600;
