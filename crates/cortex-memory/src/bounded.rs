//! [`BoundedStore`] – capacity-limited key/value store with a pluggable
//! eviction rule.
//!
//! Entries are kept in insertion order.  When a `put` of a *new* key finds
//! the store full, the [`EvictionPolicy`] picks exactly one victim, which is
//! removed before the new entry is appended.  Overwriting an existing key
//! replaces the whole entry in place and never evicts.
//!
//! Every stored entry carries at least `priority` and `timestamp` metadata;
//! missing fields are defaulted to `"normal"` and the current time.

use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;

use chrono::Utc;
use cortex_types::{CortexError, Map, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A single stored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundedEntry {
    pub key: String,
    pub value: Value,
    pub metadata: Map<String, Value>,
}

/// Chooses which entry leaves a full store.
pub trait EvictionPolicy: Send + Sync + 'static {
    /// Capacity used by [`BoundedStore::new`].
    const DEFAULT_CAPACITY: usize;

    /// Pick the victim from a non-empty store.  `entries` iterates in
    /// insertion order as `(sequence, entry)` pairs; return the sequence.
    fn select_victim<'a, I>(entries: I) -> Option<u64>
    where
        I: Iterator<Item = (&'a u64, &'a BoundedEntry)>;
}

/// Capacity-bounded store parameterised by its eviction policy.
pub struct BoundedStore<P: EvictionPolicy> {
    capacity: usize,
    entries: BTreeMap<u64, BoundedEntry>,
    index: HashMap<String, u64>,
    next_seq: u64,
    _policy: PhantomData<P>,
}

impl<P: EvictionPolicy> Default for BoundedStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: EvictionPolicy> BoundedStore<P> {
    /// Store with the policy's default capacity.
    pub fn new() -> Self {
        Self::with_capacity(P::DEFAULT_CAPACITY)
    }

    /// Store holding at most `capacity` entries (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
            _policy: PhantomData,
        }
    }

    /// Insert or overwrite `key`.
    ///
    /// Returns the evicted entry, if the insert displaced one.
    ///
    /// # Errors
    ///
    /// [`CortexError::InvalidArguments`] when `key` is empty.
    pub fn put(
        &mut self,
        key: &str,
        value: Value,
        metadata: Option<Map<String, Value>>,
    ) -> Result<Option<BoundedEntry>, CortexError> {
        if key.is_empty() {
            return Err(CortexError::invalid_args("key must be a non-empty string"));
        }
        let mut metadata = metadata.unwrap_or_default();
        metadata
            .entry("priority")
            .or_insert_with(|| Value::from("normal"));
        metadata
            .entry("timestamp")
            .or_insert_with(|| Value::from(Utc::now().to_rfc3339()));
        let entry = BoundedEntry {
            key: key.to_string(),
            value,
            metadata,
        };

        if let Some(seq) = self.index.get(key) {
            self.entries.insert(*seq, entry);
            return Ok(None);
        }

        let evicted = if self.entries.len() >= self.capacity {
            P::select_victim(self.entries.iter())
                .and_then(|seq| self.entries.remove(&seq))
                .inspect(|victim| {
                    self.index.remove(&victim.key);
                    debug!(key = %victim.key, "entry evicted");
                })
        } else {
            None
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(key.to_string(), seq);
        self.entries.insert(seq, entry);
        Ok(evicted)
    }

    pub fn get(&self, key: &str) -> Option<&BoundedEntry> {
        self.index.get(key).and_then(|seq| self.entries.get(seq))
    }

    /// Remove `key`, returning its entry if present.
    pub fn delete(&mut self, key: &str) -> Option<BoundedEntry> {
        let seq = self.index.remove(key)?;
        self.entries.remove(&seq)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.values().map(|e| e.key.as_str()).collect()
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &BoundedEntry> {
        self.entries.values()
    }

    /// Remove everything; returns how many entries were dropped.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.index.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
