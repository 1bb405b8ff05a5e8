//! Cache – fast recall of recently useful data, pruned by priority.
//!
//! When full, the entry with the lowest `metadata.priority` is evicted
//! (`low` < `normal` < `high`, numeric priorities compare directly).  Among
//! equally low entries the earliest inserted goes first.  Unrecognised
//! priority values count as `normal`.

use cortex_types::Priority;

use crate::bounded::{BoundedEntry, BoundedStore, EvictionPolicy};

/// Evicts the lowest-priority entry, oldest first on ties.
#[derive(Debug, Default, Clone, Copy)]
pub struct LowestPriority;

impl EvictionPolicy for LowestPriority {
    const DEFAULT_CAPACITY: usize = 50;

    fn select_victim<'a, I>(entries: I) -> Option<u64>
    where
        I: Iterator<Item = (&'a u64, &'a BoundedEntry)>,
    {
        entries
            .map(|(seq, entry)| {
                let rank = Priority::from_metadata(entry.metadata.get("priority")).numeric();
                (rank, *seq)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, seq)| seq)
    }
}

/// Priority-pruned store, capacity 50 by default.
pub type Cache = BoundedStore<LowestPriority>;
