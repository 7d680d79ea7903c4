//! Local content and metadata storage
//!
//! Everything stored here is assumed to be validated already; reads never
//! re-validate.

use crate::config::OverwritePolicy;
use crate::error::{DhtError, Result};
use crate::MAX_VALUE_SIZE;
use hashmesh_protocol::{EntryPayload, Hash, Meta};
use std::collections::HashMap;

/// Hash -> opaque value store
#[derive(Debug)]
pub struct ContentStore {
    /// Stored values by key
    entries: HashMap<Hash, Vec<u8>>,

    /// Current storage size in bytes
    current_size: usize,

    /// Maximum size of a single value
    max_value_size: usize,

    policy: OverwritePolicy,
}

impl ContentStore {
    /// Create new content store
    pub fn new() -> Self {
        Self::with_policy(OverwritePolicy::default(), MAX_VALUE_SIZE)
    }

    /// Create with an explicit overwrite policy and value limit
    pub fn with_policy(policy: OverwritePolicy, max_value_size: usize) -> Self {
        ContentStore {
            entries: HashMap::new(),
            current_size: 0,
            max_value_size,
            policy,
        }
    }

    /// Get current storage size in bytes
    pub fn size(&self) -> usize {
        self.current_size
    }

    /// Get number of stored keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store a value
    ///
    /// Returns `true` if the store changed.
    pub fn put(&mut self, key: Hash, value: Vec<u8>) -> Result<bool> {
        if value.len() > self.max_value_size {
            return Err(DhtError::ValueTooLarge {
                size: value.len(),
                max: self.max_value_size,
            });
        }

        if let Some(existing) = self.entries.get(&key) {
            if existing == &value {
                return Ok(false);
            }
            if self.policy == OverwritePolicy::RejectConflicting {
                return Err(DhtError::AlreadyExists(key));
            }
        }

        let new_len = value.len();
        if let Some(old) = self.entries.insert(key, value) {
            self.current_size -= old.len();
        }
        self.current_size += new_len;

        Ok(true)
    }

    /// Check for the existence of a key
    pub fn exists(&self, key: &Hash) -> bool {
        self.entries.contains_key(key)
    }

    /// Retrieve a value
    pub fn get(&self, key: &Hash) -> Result<&[u8]> {
        self.entries
            .get(key)
            .map(Vec::as_slice)
            .ok_or(DhtError::NotFound(*key))
    }
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash -> ordered metadata store
///
/// Append-only: there is no retention or compaction policy.
#[derive(Debug, Default)]
pub struct MetadataStore {
    entries: HashMap<Hash, Vec<Meta>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a meta to a key's collection
    fn append(&mut self, key: Hash, meta: Meta) {
        self.entries.entry(key).or_default().push(meta);
    }

    /// Metas of one type, in insertion order
    fn of_type(&self, key: &Hash, meta_type: &str) -> Vec<Meta> {
        self.entries
            .get(key)
            .map(|metas| {
                metas
                    .iter()
                    .filter(|m| m.meta_type == meta_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All metas attached to a key
    fn all(&self, key: &Hash) -> &[Meta] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of metas across all keys
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Content plus metadata, guarded together by one lock
#[derive(Debug, Default)]
pub struct LocalStore {
    content: ContentStore,
    metadata: MetadataStore,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: OverwritePolicy, max_value_size: usize) -> Self {
        LocalStore {
            content: ContentStore::with_policy(policy, max_value_size),
            metadata: MetadataStore::new(),
        }
    }

    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Store a validated value
    pub fn put(&mut self, key: Hash, value: Vec<u8>) -> Result<bool> {
        self.content.put(key, value)
    }

    pub fn exists(&self, key: &Hash) -> bool {
        self.content.exists(key)
    }

    pub fn get(&self, key: &Hash) -> Result<&[u8]> {
        self.content.get(key)
    }

    /// Attach a meta to a stored key
    pub fn put_meta(
        &mut self,
        key: Hash,
        meta_key: Hash,
        meta_type: &str,
        value: Vec<u8>,
    ) -> Result<()> {
        if !self.content.exists(&key) {
            return Err(DhtError::NotFound(key));
        }

        let meta = Meta::new(meta_key, meta_type, value);
        self.metadata.append(key, meta);
        Ok(())
    }

    /// Retrieve metas of one type for a stored key
    pub fn get_meta(&self, key: &Hash, meta_type: &str) -> Result<Vec<Meta>> {
        if !self.content.exists(key) {
            return Err(DhtError::NotFound(*key));
        }

        let results = self.metadata.of_type(key, meta_type);
        if results.is_empty() {
            return Err(DhtError::MetaNotFound {
                key: *key,
                meta_type: meta_type.to_string(),
            });
        }

        Ok(results)
    }

    /// Every meta attached to a key, in insertion order
    pub fn all_meta(&self, key: &Hash) -> &[Meta] {
        self.metadata.all(key)
    }

    /// Value and metadata in one payload
    pub fn entry(&self, key: &Hash) -> Result<EntryPayload> {
        let value = self.content.get(key)?.to_vec();

        Ok(EntryPayload {
            hash: *key,
            value,
            metas: self.all_meta(key).to_vec(),
        })
    }
}
