//! Persistent key/value regions backed by [`KvStore`].
//!
//! | Operation | Arguments | Result |
//! |---|---|---|
//! | `store` | `key`, `value`, `metadata`? | [`KvRecord`][cortex_memory::KvRecord] |
//! | `retrieve` | `key` | [`Lookup`] of `KvRecord` |
//! | `delete` | `key` | `{"deleted": bool}` |
//! | `list` | – | `[KvRecord]` |
//! | `retrieve_by_tag` | `tag` | `[KvRecord]` |
//! | `retrieve_by_priority` | `priority`? (default `"high"`) | `[KvRecord]` |
//! | `retrieve_by_importance` | `min_importance`? (default 5) | `[KvRecord]` |
//! | `retrieve_by_category` | `category` | `[KvRecord]` |
//! | `retrieve_by_metadata` | `tag`?, `timestamp`? | `[KvRecord]` |
//! | `add_tag` | `key`, `tag` | `KvRecord` |
//! | `remove_tag` | `key`, `tag` | `{"removed": bool}` |
//! | `update` | `key`, `patch` | `KvRecord` |
//! | `clear_older_than` | `days` | `{"removed": n}` |
//! | `clear_by_priority` | `priority`? (default `"low"`), `max_age_days`? (default 30) | `{"removed": n}` |
//! | `clear_low_importance` | `min_importance`? (default 5) | `{"removed": n}` |
//!
//! `retrieve_by_metadata` keeps records carrying `tag` whose
//! `metadata.timestamp` is not earlier than `timestamp`; an omitted filter
//! matches everything.  Ages too large for the calendar are
//! `invalid_arguments`.
//!
//! SQLite calls block, so every operation runs on the blocking pool.  A call
//! abandoned by timeout or cancellation still finishes its statement in the
//! background.

use std::sync::{Arc, Mutex};

use cortex_kernel::{CapabilityHandle, OperationFuture, Region};
use cortex_memory::{DEFAULT_IMPORTANCE, KvStore};
use cortex_types::{Args, CortexError, Lookup, Map, Value};
use futures_util::FutureExt;
use serde_json::json;

use super::{encode, lock};

/// Publishes a [`KvStore`] as a region.
pub struct KvRegion {
    name: String,
    store: Arc<Mutex<KvStore>>,
}

impl KvRegion {
    pub fn new(name: impl Into<String>, store: KvStore) -> Self {
        Self {
            name: name.into(),
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap a synchronous store operation so it runs via `spawn_blocking`.
fn blocking<F>(
    store: &Arc<Mutex<KvStore>>,
    op: F,
) -> impl Fn(Args) -> OperationFuture + Send + Sync + 'static
where
    F: Fn(&KvStore, Args) -> Result<Value, CortexError> + Send + Sync + 'static,
{
    let store = store.clone();
    let op = Arc::new(op);
    move |args| {
        let store = store.clone();
        let op = op.clone();
        async move {
            tokio::task::spawn_blocking(move || op(&lock(&store), args))
                .await
                .map_err(|e| CortexError::fault(format!("storage worker failed: {e}")))?
        }
        .boxed()
    }
}

fn store_op(kv: &KvStore, args: Args) -> Result<Value, CortexError> {
    let key: String = args.required(0, "key")?;
    let value = args.get(1, "value").cloned().unwrap_or(Value::Null);
    let metadata: Option<Map<String, Value>> = args.optional(2, "metadata")?;
    encode(&kv.store(&key, value, metadata)?)
}

fn retrieve_op(kv: &KvStore, args: Args) -> Result<Value, CortexError> {
    let key: String = args.required(0, "key")?;
    encode(&Lookup::from_option(&key, kv.retrieve(&key)?))
}

fn delete_op(kv: &KvStore, args: Args) -> Result<Value, CortexError> {
    let key: String = args.required(0, "key")?;
    Ok(json!({ "deleted": kv.delete(&key)? }))
}

fn update_op(kv: &KvStore, args: Args) -> Result<Value, CortexError> {
    let key: String = args.required(0, "key")?;
    let patch: Value = args.required(1, "patch")?;
    encode(&kv.update(&key, patch)?)
}

fn tag_args(args: &Args) -> Result<(String, String), CortexError> {
    Ok((args.required(0, "key")?, args.required(1, "tag")?))
}

fn min_importance(args: &Args) -> Result<i64, CortexError> {
    Ok(args
        .optional(0, "min_importance")?
        .unwrap_or(DEFAULT_IMPORTANCE))
}

fn metadata_op(kv: &KvStore, args: Args) -> Result<Value, CortexError> {
    let tag: Option<String> = args.optional(0, "tag")?;
    let since: Option<String> = args.optional(1, "timestamp")?;
    encode(&kv.retrieve_by_metadata(tag.as_deref(), since.as_deref())?)
}

fn clear_by_priority_op(kv: &KvStore, args: Args) -> Result<Value, CortexError> {
    let priority: Option<String> = args.optional(0, "priority")?;
    let max_age_days: u32 = args.optional(1, "max_age_days")?.unwrap_or(30);
    let removed = kv.clear_by_priority(priority.as_deref().unwrap_or("low"), max_age_days)?;
    Ok(json!({ "removed": removed }))
}

impl Region for KvRegion {
    fn capability(self: Arc<Self>) -> Result<CapabilityHandle, CortexError> {
        let s = &self.store;
        CapabilityHandle::builder(self.name.clone())
            .async_op("store", blocking(s, store_op))
            .async_op("retrieve", blocking(s, retrieve_op))
            .async_op("delete", blocking(s, delete_op))
            .async_op("list", blocking(s, |kv, _| encode(&kv.list()?)))
            .async_op(
                "retrieve_by_tag",
                blocking(s, |kv, args| {
                    let tag: String = args.required(0, "tag")?;
                    encode(&kv.retrieve_by_tag(&tag)?)
                }),
            )
            .async_op(
                "retrieve_by_priority",
                blocking(s, |kv, args| {
                    let priority: Option<String> = args.optional(0, "priority")?;
                    encode(&kv.retrieve_by_priority(priority.as_deref().unwrap_or("high"))?)
                }),
            )
            .async_op(
                "retrieve_by_importance",
                blocking(s, |kv, args| {
                    encode(&kv.retrieve_by_importance(min_importance(&args)?)?)
                }),
            )
            .async_op(
                "retrieve_by_category",
                blocking(s, |kv, args| {
                    let category: String = args.required(0, "category")?;
                    encode(&kv.retrieve_by_category(&category)?)
                }),
            )
            .async_op("retrieve_by_metadata", blocking(s, metadata_op))
            .async_op(
                "add_tag",
                blocking(s, |kv, args| {
                    let (key, tag) = tag_args(&args)?;
                    encode(&kv.add_tag(&key, &tag)?)
                }),
            )
            .async_op(
                "remove_tag",
                blocking(s, |kv, args| {
                    let (key, tag) = tag_args(&args)?;
                    Ok(json!({ "removed": kv.remove_tag(&key, &tag)? }))
                }),
            )
            .async_op("update", blocking(s, update_op))
            .async_op(
                "clear_older_than",
                blocking(s, |kv, args| {
                    let days: u32 = args.required(0, "days")?;
                    Ok(json!({ "removed": kv.clear_older_than(days)? }))
                }),
            )
            .async_op("clear_by_priority", blocking(s, clear_by_priority_op))
            .async_op(
                "clear_low_importance",
                blocking(s, |kv, args| {
                    Ok(json!({ "removed": kv.clear_low_importance(min_importance(&args)?)? }))
                }),
            )
            .build()
    }
}
