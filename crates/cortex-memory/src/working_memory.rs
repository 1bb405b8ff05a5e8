//! Working memory – the short-lived scratchpad of active context.
//!
//! A FIFO-bounded [`BoundedStore`]: when full, the entry inserted earliest is
//! evicted.  Reading an entry does not refresh it.

use crate::bounded::{BoundedEntry, BoundedStore, EvictionPolicy};

/// Evicts the oldest-inserted entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertionOrder;

impl EvictionPolicy for InsertionOrder {
    const DEFAULT_CAPACITY: usize = 20;

    fn select_victim<'a, I>(mut entries: I) -> Option<u64>
    where
        I: Iterator<Item = (&'a u64, &'a BoundedEntry)>,
    {
        // Sequences ascend with insertion.
        entries.next().map(|(seq, _)| *seq)
    }
}

/// FIFO store of active context, capacity 20 by default.
pub type WorkingMemory = BoundedStore<InsertionOrder>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_capacity_is_twenty() {
        assert_eq!(WorkingMemory::new().capacity(), 20);
    }

    #[test]
    fn overflow_evicts_exactly_the_first_insert() {
        let capacity = 5;
        let mut wm = WorkingMemory::with_capacity(capacity);
        for i in 0..capacity {
            assert!(wm.put(&format!("k{i}"), json!(i), None).unwrap().is_none());
        }
        let evicted = wm.put("k5", json!(5), None).unwrap().expect("eviction");
        assert_eq!(evicted.key, "k0");
        assert_eq!(wm.len(), capacity);
        assert_eq!(wm.keys(), vec!["k1", "k2", "k3", "k4", "k5"]);
    }

    #[test]
    fn reads_do_not_refresh_recency() {
        let mut wm = WorkingMemory::with_capacity(2);
        wm.put("a", json!("alpha"), None).unwrap();
        wm.put("b", json!("beta"), None).unwrap();
        assert_eq!(wm.get("a").unwrap().value, json!("alpha"));
        wm.put("c", json!("gamma"), None).unwrap();
        assert!(wm.get("a").is_none());
        assert_eq!(wm.keys(), vec!["b", "c"]);
    }

    #[test]
    fn deleted_slot_is_reused_without_eviction() {
        let mut wm = WorkingMemory::with_capacity(2);
        wm.put("a", json!(1), None).unwrap();
        wm.put("b", json!(2), None).unwrap();
        wm.delete("a");
        assert!(wm.put("c", json!(3), None).unwrap().is_none());
        assert_eq!(wm.keys(), vec!["b", "c"]);
    }
}
