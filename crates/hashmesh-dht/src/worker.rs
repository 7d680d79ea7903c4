//! Put worker
//!
//! Drains the request queue: for each announced hash, pulls the value and
//! metadata back from the announcing node, validates it, and stores it.

use crate::dht::Dht;
use crate::error::{DhtError, Result};
use crate::queue::QueuedRequest;
use hashmesh_protocol::{EntryPayload, Hash};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Check applied to a pulled entry before it is stored
pub trait EntryValidator: Send + Sync {
    fn validate(&self, announced: &Hash, entry: &EntryPayload) -> Result<()>;
}

/// Accept an entry only if its value hashes to the announced key
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHashValidator;

impl EntryValidator for ContentHashValidator {
    fn validate(&self, announced: &Hash, entry: &EntryPayload) -> Result<()> {
        if entry.hash != *announced {
            return Err(DhtError::ValidationFailed(format!(
                "announced {} but received {}",
                announced, entry.hash
            )));
        }

        let actual = Hash::digest(&entry.value);
        if actual != *announced {
            return Err(DhtError::ValidationFailed(format!(
                "value hashes to {}, not {}",
                actual, announced
            )));
        }

        Ok(())
    }
}

/// Accept everything
///
/// For keys that are not content addresses of their value.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl EntryValidator for AcceptAll {
    fn validate(&self, _announced: &Hash, _entry: &EntryPayload) -> Result<()> {
        Ok(())
    }
}

/// What happened to one queued request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Value stored, with this many new metadata entries
    Stored { metas_added: usize },
    /// Pull, validation or storage failed; the request was dropped
    Dropped,
}

pub struct PutWorker {
    dht: Arc<Dht>,
    validator: Arc<dyn EntryValidator>,
}

impl PutWorker {
    pub fn new(dht: Arc<Dht>, validator: Arc<dyn EntryValidator>) -> Self {
        PutWorker { dht, validator }
    }

    /// Process one request already taken off the queue
    pub async fn process(&self, request: QueuedRequest) -> PutOutcome {
        let source = request.message.source;
        let Some(&key) = request.message.hash() else {
            warn!("Queued request from {} carries no hash", source);
            return PutOutcome::Dropped;
        };

        match self.pull_and_store(source, key).await {
            Ok(metas_added) => {
                debug!(
                    "Stored {} from {} ({} new metas)",
                    key, source, metas_added
                );
                PutOutcome::Stored { metas_added }
            }
            Err(e) => {
                warn!("Dropping put of {} from {}: {}", key, source, e);
                PutOutcome::Dropped
            }
        }
    }

    async fn pull_and_store(
        &self,
        source: hashmesh_protocol::NodeId,
        key: Hash,
    ) -> Result<usize> {
        let entry = self.dht.fetch_entry(&source, key).await?;
        self.validator.validate(&key, &entry)?;
        self.dht.store_entry(entry).await
    }

    /// Wait for the next request and process it
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn process_next(&self) -> Option<PutOutcome> {
        let request = self.dht.queue().take().await?;
        Some(self.process(request).await)
    }

    /// Process requests until the queue is closed and drained
    pub async fn run(self) {
        info!("Put worker started on {}", self.dht.node_id());

        let mut stored = 0usize;
        let mut dropped = 0usize;
        while let Some(outcome) = self.process_next().await {
            match outcome {
                PutOutcome::Stored { .. } => stored += 1,
                PutOutcome::Dropped => dropped += 1,
            }
        }

        info!(
            "Put worker on {} stopped ({} stored, {} dropped)",
            self.dht.node_id(),
            stored,
            dropped
        );
    }

    /// Run on a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
