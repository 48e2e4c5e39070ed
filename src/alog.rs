//! Append-Only Log: a buffered sink for opaque record bytes. Entries are
//! handed to the log in insertion order; the log owns its buffer and
//! flush policy and periodically flushes the concatenated buffer to a
//! single backing file in one contiguous write.
//!
//! Unlike a rotating multi-file journal with CBOR-encoded indices and
//! replay support, this log is write-only and single-file: there is no
//! compaction or replay, so there is no index to maintain and nothing to
//! load back.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
};

use log::debug;
use parking_lot::Mutex;

use crate::{err_at, Result};

struct Inner {
    file: fs::File,
    buffer: Vec<u8>,
    threshold: usize,
}

impl Inner {
    fn add_record(&mut self, bytes: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() >= self.threshold {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        err_at!(IOError, self.file.write_all(&self.buffer))?;
        err_at!(IOError, self.file.flush())?;
        debug!(target: "shardb::alog", "flushed {} bytes", self.buffer.len());
        self.buffer.clear();
        Ok(())
    }
}

enum Backend {
    /// Flush happens synchronously on the caller's thread.
    Inline(Mutex<Inner>),
    /// Records are handed off to a dedicated writer thread over a bounded
    /// channel; a full channel blocks the caller, preserving commit order.
    Offloaded { tx: mpsc::SyncSender<Vec<u8>>, handle: Mutex<Option<thread::JoinHandle<()>>> },
}

/// The durable record stream. See module docs.
pub struct AppendLog {
    path: PathBuf,
    backend: Backend,
}

impl AppendLog {
    /// Open (creating if needed) `path`, flushing inline on the calling
    /// thread when the buffer crosses `threshold` bytes.
    pub fn open(path: impl AsRef<Path>, threshold: usize) -> Result<AppendLog> {
        let path = path.as_ref().to_path_buf();
        let file = err_at!(IOError, fs::OpenOptions::new().create(true).append(true).open(&path))?;
        debug!(target: "shardb::alog", "opened {:?}", path);
        Ok(AppendLog {
            path,
            backend: Backend::Inline(Mutex::new(Inner { file, buffer: vec![], threshold })),
        })
    }

    /// Like [`AppendLog::open`], but buffering and flushing are offloaded
    /// to a dedicated background thread fed by a bounded
    /// `mpsc::sync_channel` instead of flushing inline on the caller.
    pub fn open_background(path: impl AsRef<Path>, threshold: usize, queue_depth: usize) -> Result<AppendLog> {
        let path = path.as_ref().to_path_buf();
        let file = err_at!(IOError, fs::OpenOptions::new().create(true).append(true).open(&path))?;
        let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(queue_depth.max(1));

        let writer_path = path.clone();
        let handle = thread::spawn(move || {
            let mut inner = Inner { file, buffer: vec![], threshold };
            for record in rx {
                if let Err(err) = inner.add_record(&record) {
                    log::warn!(target: "shardb::alog", "background flush to {:?} failed: {:?}", writer_path, err);
                }
            }
            if let Err(err) = inner.flush() {
                log::warn!(target: "shardb::alog", "final flush to {:?} failed: {:?}", writer_path, err);
            }
        });

        debug!(target: "shardb::alog", "opened {:?} with background writer", path);
        Ok(AppendLog {
            path,
            backend: Backend::Offloaded { tx, handle: Mutex::new(Some(handle)) },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Enqueue `bytes` for durable append, in commit order.
    pub fn add_record(&self, bytes: &[u8]) -> Result<()> {
        match &self.backend {
            Backend::Inline(inner) => inner.lock().add_record(bytes),
            Backend::Offloaded { tx, .. } => {
                err_at!(IPCFail, tx.send(bytes.to_vec()))
            }
        }
    }

    /// Flush any buffered bytes and release the file handle. For an
    /// offloaded log, drops the sender so the writer thread drains and
    /// exits, then joins it.
    pub fn close(self) -> Result<()> {
        match self.backend {
            Backend::Inline(inner) => inner.lock().flush(),
            Backend::Offloaded { tx, handle } => {
                drop(tx);
                if let Some(handle) = handle.lock().take() {
                    err_at!(ThreadFail, handle.join().map_err(|_| "writer thread panicked"))?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "alog_test.rs"]
mod alog_test;
