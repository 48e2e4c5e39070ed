//! Memory Governor: samples process memory, maintains the recency index,
//! fires eviction/emergency callbacks, answers admission-control queries,
//! and provides a rough size estimator.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering::SeqCst},
    Arc,
};

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rmpv::Value;
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};
use tokio::task::JoinHandle;

use crate::{
    config::{EvictionPolicy, MemoryConfig},
    recency::{RecencyIndex, RecencyKey},
};

pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Snapshot returned by [`Governor::stats`].
#[derive(Debug, Clone, Copy)]
pub struct MemoryStats {
    pub rss_bytes: u64,
    pub heap_bytes: u64,
    pub usage_fraction: f64,
    pub monitoring: bool,
}

pub struct Governor {
    config: Mutex<MemoryConfig>,
    recency: Mutex<RecencyIndex>,
    estimated_heap_bytes: AtomicU64,
    on_eviction: Mutex<Vec<Callback>>,
    on_emergency: Mutex<Vec<Callback>>,
    monitoring: AtomicBool,
    sampler: Mutex<Option<JoinHandle<()>>>,
    sys: Mutex<System>,
    pid: Pid,
}

impl Governor {
    pub fn new(config: MemoryConfig) -> Arc<Governor> {
        let pid = Pid::from_u32(std::process::id());
        let sys = System::new_with_specifics(
            RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing().with_memory()),
        );
        Arc::new(Governor {
            config: Mutex::new(config),
            recency: Mutex::new(RecencyIndex::new()),
            estimated_heap_bytes: AtomicU64::new(0),
            on_eviction: Mutex::new(vec![]),
            on_emergency: Mutex::new(vec![]),
            monitoring: AtomicBool::new(false),
            sampler: Mutex::new(None),
            sys: Mutex::new(sys),
            pid,
        })
    }

    pub fn update_config(&self, config: MemoryConfig) {
        *self.config.lock() = config;
    }

    pub fn config(&self) -> MemoryConfig {
        self.config.lock().clone()
    }

    pub fn on_eviction(&self, cb: Callback) {
        self.on_eviction.lock().push(cb);
    }

    pub fn on_emergency(&self, cb: Callback) {
        self.on_emergency.lock().push(cb);
    }

    fn rss_bytes(&self) -> u64 {
        let mut sys = self.sys.lock();
        sys.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        sys.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }

    fn heap_bytes(&self) -> u64 {
        self.estimated_heap_bytes.load(SeqCst)
    }

    /// Track `delta` bytes added to (positive) or removed from (negative
    /// via `sub`) the estimated in-memory document footprint. Called on
    /// every successful insert/delete since true heap-in-use is not
    /// portably observable without an allocator hook (see DESIGN.md).
    pub fn account(&self, delta: i64) {
        if delta >= 0 {
            self.estimated_heap_bytes.fetch_add(delta as u64, SeqCst);
        } else {
            let n = (-delta) as u64;
            self.estimated_heap_bytes.fetch_update(SeqCst, SeqCst, |cur| Some(cur.saturating_sub(n))).ok();
        }
    }

    pub fn stats(&self) -> MemoryStats {
        let cfg = self.config();
        let rss = self.rss_bytes();
        let heap = self.heap_bytes();
        let usage_fraction = (rss as f64 / cfg.max_rss_bytes as f64)
            .max(heap as f64 / cfg.max_heap_bytes as f64);
        MemoryStats { rss_bytes: rss, heap_bytes: heap, usage_fraction, monitoring: self.monitoring.load(SeqCst) }
    }

    /// Returns `true` iff both projected RSS and projected heap, scaled by
    /// a safety margin, remain strictly under the configured limits.
    pub fn can_allocate(&self, est_bytes: usize) -> bool {
        let cfg = self.config();
        let margin = if est_bytes <= 1024 * 1024 * 1024 { 1.02 } else { 1.01 };
        let projected_rss = (self.rss_bytes() as f64 + est_bytes as f64) * margin;
        let projected_heap = (self.heap_bytes() as f64 + est_bytes as f64) * margin;
        projected_rss < cfg.max_rss_bytes as f64 && projected_heap < cfg.max_heap_bytes as f64
    }

    pub fn record_access(&self, key: RecencyKey, size: usize) {
        self.recency.lock().record(key, size);
    }

    pub fn record_access_bulk(&self, entries: impl IntoIterator<Item = (RecencyKey, usize)>) {
        self.recency.lock().record_bulk(entries);
    }

    pub fn forget(&self, key: &RecencyKey) {
        self.recency.lock().remove(key);
    }

    pub fn recency_len(&self) -> usize {
        self.recency.lock().len()
    }

    pub fn contains_recency(&self, key: &RecencyKey) -> bool {
        self.recency.lock().contains(key)
    }

    /// Recency- or random-ordered keys whose cumulative estimated size
    /// reaches `target_bytes`; empty if the eviction policy is `None`.
    pub fn evict_candidates(&self, target_bytes: usize) -> Vec<RecencyKey> {
        let policy = self.config().eviction_policy;
        match policy {
            EvictionPolicy::None => vec![],
            EvictionPolicy::Recency => self.recency.lock().oldest_until(target_bytes),
            EvictionPolicy::Random => self.random_candidates(target_bytes),
        }
    }

    fn random_candidates(&self, target_bytes: usize) -> Vec<RecencyKey> {
        let recency = self.recency.lock();
        let all = recency.oldest_until(usize::MAX);
        drop(recency);
        let mut shuffled = all;
        shuffled.shuffle(&mut rand::thread_rng());
        let recency = self.recency.lock();
        let mut acc = 0usize;
        let mut out = vec![];
        for key in shuffled {
            if acc >= target_bytes {
                break;
            }
            if let Some(size) = recency.est_size(&key) {
                acc += size;
                out.push(key);
            }
        }
        out
    }

    pub fn start_monitoring(self: &Arc<Self>) {
        if self.monitoring.swap(true, SeqCst) {
            return; // idempotent
        }
        let this = Arc::clone(self);
        let interval = this.config().sample_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !this.monitoring.load(SeqCst) {
                    break;
                }
                this.sample_once();
            }
        });
        *self.sampler.lock() = Some(handle);
    }

    pub fn stop_monitoring(&self) {
        if !self.monitoring.swap(false, SeqCst) {
            return; // idempotent
        }
        if let Some(handle) = self.sampler.lock().take() {
            handle.abort();
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(SeqCst)
    }

    /// Run one sampling pass immediately, outside the periodic ticker —
    /// used by operators to force an eviction/emergency check without
    /// waiting for the next tick, and by tests that can't wait on real
    /// time.
    pub fn sample_now(&self) {
        self.sample_once();
    }

    fn sample_once(&self) {
        let cfg = self.config();
        let rss = self.rss_bytes();
        let heap = self.heap_bytes();
        let usage_fraction = (rss as f64 / cfg.max_rss_bytes as f64)
            .max(heap as f64 / cfg.max_heap_bytes as f64);

        if usage_fraction >= cfg.eviction_threshold {
            for cb in self.on_eviction.lock().iter() {
                cb();
            }
        }
        if rss > cfg.max_rss_bytes || heap > cfg.max_heap_bytes {
            for cb in self.on_emergency.lock().iter() {
                cb();
            }
        }
    }
}

/// Rough per-shape size estimator over a decoded document value.
pub fn estimate_value(val: &Value) -> usize {
    match val {
        Value::Nil => 0,
        Value::Boolean(_) => 1,
        Value::Integer(_) | Value::F32(_) | Value::F64(_) => 8,
        Value::String(s) => 2 * s.as_str().unwrap_or("").chars().count(),
        Value::Binary(b) => 24 + b.len(),
        Value::Array(items) => 24 + items.iter().map(estimate_value).sum::<usize>(),
        Value::Map(pairs) => {
            24 + pairs
                .iter()
                .map(|(k, v)| {
                    let keylen = k.as_str().map(|s| s.chars().count()).unwrap_or(8);
                    2 * keylen + 16 + estimate_value(v)
                })
                .sum::<usize>()
        }
        Value::Ext(_, bytes) => 24 + bytes.len(),
    }
}

/// Rough estimate for an opaque byte payload as stored in a shard.
pub fn estimate_bytes(bytes: &[u8]) -> usize {
    24 + bytes.len()
}

#[cfg(test)]
#[path = "governor_test.rs"]
mod governor_test;
