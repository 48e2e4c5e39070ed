//! A single shard of the document index: a fixed-capacity partition
//! holding, per collection, the live `DocId -> bytes` map, that
//! collection's `nextId` snapshot, and a live entry count.

use std::collections::HashMap;

pub type DocId = u64;

/// Per-collection state within one shard.
#[derive(Debug, Default)]
pub struct CollectionStore {
    docs: HashMap<DocId, Vec<u8>>,
    /// Snapshot of the collection's global `nextId` counter at the point
    /// this shard's entry for the collection was created. The
    /// authoritative counter lives on `ShardSet` (see DESIGN.md); this
    /// snapshot exists purely to satisfy the per-shard data model and is
    /// never independently mutated after creation.
    next_id_snapshot: DocId,
}

impl CollectionStore {
    fn new(next_id_snapshot: DocId) -> CollectionStore {
        CollectionStore { docs: HashMap::new(), next_id_snapshot }
    }

    pub fn next_id_snapshot(&self) -> DocId {
        self.next_id_snapshot
    }
}

/// One shard: a bounded-capacity set of per-collection document stores.
pub struct Shard {
    capacity: usize,
    /// Total live entries across every collection this shard holds.
    size: usize,
    collections: HashMap<String, CollectionStore>,
}

impl Shard {
    pub fn new(capacity: usize) -> Shard {
        Shard { capacity, size: 0, collections: HashMap::new() }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_full(&self) -> bool {
        self.size >= self.capacity
    }

    /// Ensure a collection entry exists in this shard, seeding its
    /// `nextId` snapshot if it doesn't.
    pub fn ensure_collection(&mut self, collection: &str, next_id_snapshot: DocId) {
        self.collections
            .entry(collection.to_string())
            .or_insert_with(|| CollectionStore::new(next_id_snapshot));
    }

    pub fn has(&self, collection: &str, id: DocId) -> bool {
        self.collections.get(collection).map(|c| c.docs.contains_key(&id)).unwrap_or(false)
    }

    pub fn get(&self, collection: &str, id: DocId) -> Option<&[u8]> {
        self.collections.get(collection)?.docs.get(&id).map(Vec::as_slice)
    }

    /// Insert a document at `id` into `collection`, creating the
    /// collection entry in this shard if needed. Increments the shard's
    /// total size.
    pub fn insert(&mut self, collection: &str, id: DocId, doc: Vec<u8>, next_id_snapshot: DocId) {
        self.ensure_collection(collection, next_id_snapshot);
        let store = self.collections.get_mut(collection).expect("just ensured");
        store.docs.insert(id, doc);
        self.size += 1;
    }

    pub fn replace(&mut self, collection: &str, id: DocId, doc: Vec<u8>) -> Option<Vec<u8>> {
        self.collections.get_mut(collection)?.docs.insert(id, doc)
    }

    pub fn remove(&mut self, collection: &str, id: DocId) -> Option<Vec<u8>> {
        let removed = self.collections.get_mut(collection)?.docs.remove(&id);
        if removed.is_some() {
            self.size -= 1;
        }
        removed
    }

    /// Iterate over every `(id, doc bytes)` pair in `collection` held by
    /// this shard, for use by `find`'s full scan.
    pub fn iter_collection<'a>(
        &'a self,
        collection: &str,
    ) -> Box<dyn Iterator<Item = (DocId, &'a [u8])> + 'a> {
        match self.collections.get(collection) {
            Some(store) => Box::new(store.docs.iter().map(|(id, doc)| (*id, doc.as_slice()))),
            None => Box::new(std::iter::empty()),
        }
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }
}

#[cfg(test)]
#[path = "shard_test.rs"]
mod shard_test;
