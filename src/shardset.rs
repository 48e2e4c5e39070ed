//! Shard Set / Document Index: the primary key -> bytes store, sharded
//! for scale. Composes a list of [`crate::shard::Shard`]s, the
//! [`crate::governor::Governor`], and the [`crate::alog::AppendLog`], and
//! implements the engine's core operation set plus the chunked
//! bulk-insert admission policy, recency eviction wiring, and the
//! emergency brake.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::{
    alog::AppendLog,
    governor::{estimate_bytes, Governor},
    protocol::{decode_value, Response},
    shard::Shard,
    where_expr::Where,
};

pub type DocId = u64;

/// Atomically-rotated shard list plus the per-collection authoritative
/// `nextId` counters, guarded by a single mutex around the
/// rotate-and-insert critical section — the conceptual `ACCEPTING`/
/// `ROTATING` states correspond directly to this mutex being
/// available/held.
struct Inner {
    shards: Vec<Shard>,
    active: usize,
    next_ids: HashMap<String, DocId>,
    capacity: usize,
}

impl Inner {
    fn active_shard(&mut self) -> &mut Shard {
        &mut self.shards[self.active]
    }

    /// Spawn a new shard if the active one is full, seeding every known
    /// collection's `nextId` snapshot from the authoritative counters so
    /// allocation stays monotonic across shards.
    fn rotate_if_full(&mut self) {
        if !self.active_shard().is_full() {
            return;
        }
        let mut fresh = Shard::new(self.capacity);
        for (name, next_id) in self.next_ids.iter() {
            fresh.ensure_collection(name, *next_id);
        }
        self.shards.push(fresh);
        self.active = self.shards.len() - 1;
        debug!(target: "shardb::shardset", "rotated to shard {} ({} shards total)", self.active, self.shards.len());
    }

    fn locate(&self, collection: &str, id: DocId) -> Option<usize> {
        self.shards.iter().rposition(|s| s.has(collection, id))
    }

    fn alloc_id(&mut self, collection: &str) -> DocId {
        let counter = self.next_ids.entry(collection.to_string()).or_insert(0);
        let id = *counter;
        *counter += 1;
        id
    }
}

#[derive(Default)]
struct Brake {
    consecutive: u32,
    last_fired: Option<Instant>,
}

/// The document index.
pub struct ShardSet {
    inner: Mutex<Inner>,
    governor: Arc<Governor>,
    log: Arc<AppendLog>,
    brake: Mutex<Brake>,
    /// Best-effort cancellation handle for in-flight bulk writes, cleared
    /// wholesale when the governor fires an emergency callback.
    active_txns: Mutex<HashSet<u64>>,
}

impl ShardSet {
    pub fn new(capacity: usize, governor: Arc<Governor>, log: Arc<AppendLog>) -> Arc<ShardSet> {
        let set = Arc::new(ShardSet {
            inner: Mutex::new(Inner { shards: vec![Shard::new(capacity)], active: 0, next_ids: HashMap::new(), capacity }),
            governor,
            log,
            brake: Mutex::new(Brake::default()),
            active_txns: Mutex::new(HashSet::new()),
        });

        let weak = Arc::downgrade(&set);
        set.governor.on_eviction(Arc::new(move || {
            if let Some(set) = weak.upgrade() {
                set.on_eviction();
            }
        }));
        let weak = Arc::downgrade(&set);
        set.governor.on_emergency(Arc::new(move || {
            if let Some(set) = weak.upgrade() {
                set.active_txns.lock().clear();
            }
        }));

        set
    }

    pub fn shard_count(&self) -> usize {
        self.inner.lock().shards.len()
    }

    /// Clear the emergency brake's strike counter, e.g. after an operator
    /// has raised the memory ceiling following a trip.
    pub fn reset_brake(&self) {
        let mut brake = self.brake.lock();
        brake.consecutive = 0;
        brake.last_fired = None;
    }

    fn record_touch(&self, collection: &str, id: DocId, size: usize) {
        self.governor.record_access((collection.to_string(), id), size);
    }

    pub fn get(&self, collection: &str, id: DocId) -> Response<(DocId, Vec<u8>)> {
        let inner = self.inner.lock();
        match inner.locate(collection, id) {
            Some(idx) => {
                let doc = inner.shards[idx].get(collection, id).expect("located").to_vec();
                drop(inner);
                self.record_touch(collection, id, estimate_bytes(&doc));
                Response::ok((id, doc))
            }
            None => Response::error(),
        }
    }

    pub fn get_many(&self, collection: &str, ids: &[DocId]) -> Response<HashMap<DocId, Vec<u8>>> {
        let mut out = HashMap::new();
        for &id in ids {
            if let Response { data: Some((id, doc)), .. } = self.get(collection, id) {
                out.insert(id, doc);
            }
        }
        Response::ok(out)
    }

    pub fn set(&self, collection: &str, doc: Vec<u8>) -> Response<DocId> {
        let mut inner = self.inner.lock();
        inner.rotate_if_full();
        let id = inner.alloc_id(collection);
        let snapshot = id;
        inner.active_shard().insert(collection, id, doc.clone(), snapshot);
        drop(inner);

        if let Err(err) = self.log.add_record(&doc) {
            warn!(target: "shardb::shardset", "log append failed: {:?}", err);
        }
        let size = estimate_bytes(&doc);
        self.governor.account(size as i64);
        self.record_touch(collection, id, size);
        Response::ok(id)
    }

    pub fn update(&self, collection: &str, id: DocId, doc: Vec<u8>) -> Response<(DocId, Vec<u8>)> {
        let mut inner = self.inner.lock();
        match inner.locate(collection, id) {
            Some(idx) => {
                let old_size = inner.shards[idx].get(collection, id).map(estimate_bytes).unwrap_or(0);
                inner.shards[idx].replace(collection, id, doc.clone());
                drop(inner);
                let new_size = estimate_bytes(&doc);
                self.governor.account(new_size as i64 - old_size as i64);
                self.record_touch(collection, id, new_size);
                Response::ok((id, doc))
            }
            None => Response::error(),
        }
    }

    pub fn delete(&self, collection: &str, id: DocId) -> Response<DocId> {
        let mut inner = self.inner.lock();
        match inner.locate(collection, id) {
            Some(idx) => {
                let removed = inner.shards[idx].remove(collection, id);
                drop(inner);
                if let Some(doc) = removed {
                    self.governor.account(-(estimate_bytes(&doc) as i64));
                }
                self.governor.forget(&(collection.to_string(), id));
                Response::ok(id)
            }
            None => Response::error(),
        }
    }

    pub fn delete_many(&self, collection: &str, ids: &[DocId]) -> Response<Vec<DocId>> {
        let removed: Vec<DocId> = ids.iter().copied().filter(|&id| self.delete(collection, id).is_ok()).collect();
        Response::ok(removed)
    }

    pub fn update_many(&self, collection: &str, items: Vec<(DocId, Vec<u8>)>) -> Response<Vec<(DocId, Vec<u8>)>> {
        let mut out = vec![];
        for (id, doc) in items {
            let resp = self.update(collection, id, doc);
            match resp.data {
                Some(pair) => out.push(pair),
                None => return Response::error(),
            }
        }
        Response::ok(out)
    }

    /// Atomic at the list boundary only: returns `ERROR` on the first
    /// missing id without rolling back entries already replaced.
    pub fn replace_many(&self, collection: &str, items: Vec<(DocId, Vec<u8>)>) -> Response<Vec<(DocId, Vec<u8>)>> {
        self.update_many(collection, items)
    }

    /// Full scan across every shard, decoding each document and
    /// evaluating `pred` against it.
    pub fn find(&self, collection: &str, pred: &Where) -> Response<Vec<(DocId, Vec<u8>)>> {
        let inner = self.inner.lock();
        let mut out = vec![];
        for shard in inner.shards.iter() {
            for (id, bytes) in shard.iter_collection(collection) {
                let matches = match decode_value(bytes) {
                    Ok(val) => pred.eval(&val),
                    Err(_) => false,
                };
                if matches {
                    out.push((id, bytes.to_vec()));
                }
            }
        }
        Response::ok(out)
    }

    /// Admission-controlled bulk insert. `is_chunked` is set on recursive
    /// calls made from within the chunked-ingest fallback so that a
    /// chunk is never itself re-chunked.
    pub fn set_many(&self, collection: &str, docs: Vec<Vec<u8>>, is_chunked: bool) -> Response<Vec<DocId>> {
        let n = docs.len();
        if n == 0 {
            return Response::ok(vec![]);
        }

        let bulk_estimate: usize = docs.iter().map(|d| estimate_bytes(d)).sum();
        let est_size = bulk_estimate + 32 * n + (50 * n).min(512 * 1024);

        if !self.governor.can_allocate(est_size) && n > 10_000 && !is_chunked {
            return self.chunked_ingest(collection, docs, bulk_estimate);
        }
        if !self.governor.can_allocate(est_size) {
            self.governor.stop_monitoring();
            return Response::error();
        }
        let stats = self.governor.stats();
        let cfg = self.governor.config();
        if stats.rss_bytes > cfg.max_rss_bytes || stats.heap_bytes > cfg.max_heap_bytes {
            return Response::error();
        }

        Response::ok(self.commit_bulk(collection, docs))
    }

    fn chunked_ingest(&self, collection: &str, docs: Vec<Vec<u8>>, bulk_estimate: usize) -> Response<Vec<DocId>> {
        let n = docs.len();
        let per_doc_est = (bulk_estimate / n).max(1);
        let stats = self.governor.stats();
        let cfg = self.governor.config();
        let available = (cfg.max_rss_bytes as f64 - stats.rss_bytes as f64).max(0.0);

        let mut chunk_size = ((0.8 * available / per_doc_est as f64).floor() as usize).clamp(1000, 50_000);
        if available < 100.0 * 1024.0 * 1024.0 {
            chunk_size = chunk_size.min(5_000);
        }

        debug!(target: "shardb::shardset", "chunked ingest of {} docs into {}-sized chunks", n, chunk_size);

        let mut ids = Vec::with_capacity(n);
        for chunk in docs.into_iter().collect::<Vec<_>>().chunks(chunk_size) {
            let resp = self.set_many(collection, chunk.to_vec(), true);
            match resp.data {
                Some(mut chunk_ids) => ids.append(&mut chunk_ids),
                None => return Response::error(),
            }
        }
        Response::ok(ids)
    }

    fn commit_bulk(&self, collection: &str, docs: Vec<Vec<u8>>) -> Vec<DocId> {
        let mut inner = self.inner.lock();
        let mut ids = Vec::with_capacity(docs.len());
        for doc in &docs {
            inner.rotate_if_full();
            let id = inner.alloc_id(collection);
            inner.active_shard().insert(collection, id, doc.clone(), id);
            ids.push(id);
        }
        drop(inner);

        for doc in &docs {
            if let Err(err) = self.log.add_record(doc) {
                warn!(target: "shardb::shardset", "log append failed during bulk commit: {:?}", err);
            }
        }
        let total: i64 = docs.iter().map(|d| estimate_bytes(d) as i64).sum();
        self.governor.account(total);
        self.governor.record_access_bulk(
            ids.iter().zip(docs.iter()).map(|(&id, doc)| ((collection.to_string(), id), estimate_bytes(doc))),
        );
        ids
    }

    /// Registered with the governor's `onEviction` hook: evict
    /// recency-ordered keys totalling `0.2 * rss`, applying a
    /// three-strikes-in-a-second emergency brake.
    fn on_eviction(&self) {
        {
            let mut brake = self.brake.lock();
            let now = Instant::now();
            match brake.last_fired {
                Some(last) if now.duration_since(last) < Duration::from_secs(1) => brake.consecutive += 1,
                _ => brake.consecutive = 0,
            }
            brake.last_fired = Some(now);
            if brake.consecutive >= 3 {
                warn!(target: "shardb::shardset", "emergency brake tripped, stopping memory monitor");
                self.governor.stop_monitoring();
                brake.consecutive = 0;
                return;
            }
        }

        let stats = self.governor.stats();
        let target = (0.2 * stats.rss_bytes as f64) as usize;
        let keys = self.governor.evict_candidates(target);
        for (collection, id) in keys {
            self.delete(&collection, id);
        }
    }
}

#[cfg(test)]
#[path = "shardset_test.rs"]
mod shardset_test;
