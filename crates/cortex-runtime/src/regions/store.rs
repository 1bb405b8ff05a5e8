//! `working_memory` / `cache` regions – bounded stores over dispatch.
//!
//! | Operation | Arguments | Result |
//! |---|---|---|
//! | `put` | `key`, `value`, `metadata`? | `{"stored": key}` |
//! | `get` | `key` | [`Lookup`] of [`BoundedEntry`][cortex_memory::BoundedEntry] |
//! | `delete` | `key` | `{"deleted": bool}` |
//! | `keys` | – | keys in insertion order |
//! | `clear` | – | `{"cleared": n}` |
//! | `len` | – | entry count |
//! | `capacity` | – | maximum entry count |
//!
//! Eviction never surfaces to the caller of `put`.

use std::sync::{Arc, Mutex};

use cortex_kernel::{CapabilityHandle, Region};
use cortex_memory::{BoundedStore, EvictionPolicy};
use cortex_types::{Args, CortexError, Lookup, Map, Value};
use serde_json::json;
use tracing::debug;

use super::{encode, lock};

/// Publishes a shared [`BoundedStore`] as a region.
pub struct StoreRegion<P: EvictionPolicy> {
    name: String,
    store: Arc<Mutex<BoundedStore<P>>>,
}

impl<P: EvictionPolicy> StoreRegion<P> {
    pub fn new(name: impl Into<String>, store: Arc<Mutex<BoundedStore<P>>>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    fn put(&self, args: Args) -> Result<Value, CortexError> {
        let key: String = args.required(0, "key")?;
        let value = args.get(1, "value").cloned().unwrap_or(Value::Null);
        let metadata: Option<Map<String, Value>> = args.optional(2, "metadata")?;
        if let Some(evicted) = lock(&self.store).put(&key, value, metadata)? {
            debug!(region = %self.name, evicted = %evicted.key, "capacity reached");
        }
        Ok(json!({ "stored": key }))
    }

    fn get(&self, args: Args) -> Result<Value, CortexError> {
        let key: String = args.required(0, "key")?;
        let entry = lock(&self.store).get(&key).cloned();
        encode(&Lookup::from_option(&key, entry))
    }

    fn delete(&self, args: Args) -> Result<Value, CortexError> {
        let key: String = args.required(0, "key")?;
        let deleted = lock(&self.store).delete(&key).is_some();
        Ok(json!({ "deleted": deleted }))
    }
}

impl<P: EvictionPolicy> Region for StoreRegion<P> {
    fn capability(self: Arc<Self>) -> Result<CapabilityHandle, CortexError> {
        let put = self.clone();
        let get = self.clone();
        let delete = self.clone();
        let keys = self.store.clone();
        let clear = self.store.clone();
        let len = self.store.clone();
        let capacity = self.store.clone();

        CapabilityHandle::builder(self.name.clone())
            .sync_op("put", move |args| put.put(args))
            .sync_op("get", move |args| get.get(args))
            .sync_op("delete", move |args| delete.delete(args))
            .sync_op("keys", move |_| encode(&lock(&keys).keys()))
            .sync_op("clear", move |_| Ok(json!({ "cleared": lock(&clear).clear() })))
            .sync_op("len", move |_| Ok(Value::from(lock(&len).len())))
            .sync_op("capacity", move |_| Ok(Value::from(lock(&capacity).capacity())))
            .build()
    }
}
