//! Recency index: maps `(collection, DocId)` to last-access time and
//! estimated byte size, used for admission-control accounting and
//! recency-ordered eviction.
//!
//! Implemented as a logical clock (`touch counter`) ordered `BTreeMap`
//! alongside a `HashMap` keyed by `(collection, id)`, giving O(log n)
//! touch and oldest-eviction. The source this crate is styled on does a
//! full sort on every eviction; a doubly linked list would reach O(1) but
//! needs unsafe intrusive-list code this crate otherwise has no use for,
//! so the B-tree is the documented middle ground (see DESIGN.md).

use std::collections::{BTreeMap, HashMap};

pub type RecencyKey = (String, u64);

#[derive(Debug, Clone, Copy)]
struct Entry {
    touch: u64,
    est_size: usize,
}

#[derive(Debug, Default)]
pub struct RecencyIndex {
    by_key: HashMap<RecencyKey, Entry>,
    by_touch: BTreeMap<u64, RecencyKey>,
    clock: u64,
}

impl RecencyIndex {
    pub fn new() -> RecencyIndex {
        RecencyIndex::default()
    }

    fn next_touch(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Upsert a single key's last-access time and estimated size.
    pub fn record(&mut self, key: RecencyKey, est_size: usize) {
        if let Some(old) = self.by_key.get(&key) {
            self.by_touch.remove(&old.touch);
        }
        let touch = self.next_touch();
        self.by_touch.insert(touch, key.clone());
        self.by_key.insert(key, Entry { touch, est_size });
    }

    /// Upsert a batch of keys in a single pass, preserving input order as
    /// the recency order (earlier entries are "older" after this call).
    pub fn record_bulk(&mut self, entries: impl IntoIterator<Item = (RecencyKey, usize)>) {
        for (key, size) in entries {
            self.record(key, size);
        }
    }

    pub fn remove(&mut self, key: &RecencyKey) {
        if let Some(entry) = self.by_key.remove(key) {
            self.by_touch.remove(&entry.touch);
        }
    }

    pub fn contains(&self, key: &RecencyKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn est_size(&self, key: &RecencyKey) -> Option<usize> {
        self.by_key.get(key).map(|e| e.est_size)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Oldest-touched keys first, whose cumulative estimated size reaches
    /// or exceeds `target_bytes`. Returns keys only — callers delete them
    /// and then call [`RecencyIndex::remove`].
    pub fn oldest_until(&self, target_bytes: usize) -> Vec<RecencyKey> {
        let mut acc = 0usize;
        let mut out = vec![];
        for key in self.by_touch.values() {
            if acc >= target_bytes {
                break;
            }
            let entry = self.by_key.get(key).expect("by_touch/by_key in sync");
            acc += entry.est_size;
            out.push(key.clone());
        }
        out
    }
}

#[cfg(test)]
#[path = "recency_test.rs"]
mod recency_test;
