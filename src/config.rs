//! Configuration surface for the engine, the memory governor, and the
//! wire protocol. Plain data with `Default` impls carrying the documented
//! defaults; no environment or CLI loader is built here — that is left
//! to whatever embeds this crate.

use std::time::Duration;

/// Eviction policy driven by the memory governor's recency index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Never evict; `canAllocate` admission control is the only guard.
    None,
    /// Evict the least-recently-touched documents first.
    Recency,
    /// Evict an arbitrary sample of documents.
    Random,
}

/// Configuration for the [`crate::governor::Governor`].
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub max_rss_bytes: u64,
    pub max_heap_bytes: u64,
    pub eviction_policy: EvictionPolicy,
    pub eviction_threshold: f64,
    pub sample_interval: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            max_rss_bytes: 1024 * 1024 * 1024,
            max_heap_bytes: 512 * 1024 * 1024,
            eviction_policy: EvictionPolicy::Recency,
            eviction_threshold: 0.8,
            sample_interval: Duration::from_millis(1000),
        }
    }
}

impl MemoryConfig {
    pub fn set_max_rss_bytes(&mut self, n: u64) -> &mut Self {
        self.max_rss_bytes = n;
        self
    }

    pub fn set_max_heap_bytes(&mut self, n: u64) -> &mut Self {
        self.max_heap_bytes = n;
        self
    }

    pub fn set_eviction_policy(&mut self, p: EvictionPolicy) -> &mut Self {
        self.eviction_policy = p;
        self
    }

    pub fn set_eviction_threshold(&mut self, t: f64) -> &mut Self {
        self.eviction_threshold = t;
        self
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the append-only log file.
    pub dir: std::path::PathBuf,
    /// File name for the append-only log, e.g. `records.aof`.
    pub log_file: String,
    /// Cumulative buffered bytes before the log flushes to disk.
    pub log_flush_threshold: usize,
    /// Maximum live entries a single shard may hold across all
    /// collections before a new shard is spawned.
    pub shard_capacity: usize,
    /// TCP bind address for [`crate::server`].
    pub bind_addr: String,
    /// Reject any frame whose length prefix exceeds this many bytes.
    pub max_message_bytes: u32,
    /// Ceiling on a single request's read, from first byte to last.
    pub read_timeout: Duration,
    /// Chunk size used when streaming frame bodies off the socket.
    pub io_chunk_bytes: usize,
    pub memory: MemoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dir: std::path::PathBuf::from("."),
            log_file: "records.aof".to_string(),
            log_flush_threshold: 4 * 1024,
            shard_capacity: 6_000_000,
            bind_addr: "127.0.0.1:7333".to_string(),
            max_message_bytes: 100 * 1024 * 1024,
            read_timeout: Duration::from_secs(30),
            io_chunk_bytes: 64 * 1024,
            memory: MemoryConfig::default(),
        }
    }
}

impl Config {
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Config {
        Config {
            dir: dir.into(),
            ..Config::default()
        }
    }

    pub fn set_shard_capacity(&mut self, n: usize) -> &mut Self {
        self.shard_capacity = n;
        self
    }

    pub fn set_bind_addr(&mut self, addr: impl Into<String>) -> &mut Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn set_log_flush_threshold(&mut self, n: usize) -> &mut Self {
        self.log_flush_threshold = n;
        self
    }
}
