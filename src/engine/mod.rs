//! # Storage Engine
//!
//! The write-dominant core: an active [`Memtable`], a bounded queue of
//! sealed memtables, one background flusher thread, and the
//! [`SSTableManager`] holding everything already on disk.
//!
//! ## Design Overview
//!
//! Data is organised in three layers, queried newest-first:
//!
//! 1. **Active memtable** — accepts every write under a short lock.
//! 2. **Immutable queue** — sealed memtables awaiting flush, front oldest.
//! 3. **Tables on disk** — indexed by the [`SSTableManager`].
//!
//! A `put` lands in the active memtable. When the memtable would cross its
//! byte budget it is rotated into the immutable queue — blocking while the
//! queue is at capacity — and the flusher is signalled. The flusher pops
//! the oldest sealed memtable, writes it out as a table, and publishes its
//! index.
//!
//! ## Durability contract
//!
//! There is no write-ahead log. Writes become visible immediately but are
//! only guaranteed durable once [`Engine::write_barrier`] returns: the
//! barrier seals the active memtable and waits until the queue is empty
//! and no flush is in flight. A crash loses at most everything since the
//! last successful barrier.
//!
//! ## Concurrency Model
//!
//! One mutex guards the engine state (active memtable, queue, the
//! flush-in-progress flag); three condition variables signal flush work,
//! backpressure relief, and barrier completion. Reads only take the state
//! lock for the in-memory layers — the on-disk index list is lock-free, so
//! lookups never serialize behind the flusher.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::memtable::{Memtable, TOMBSTONE};
use crate::sstable::{SSTableError, SSTableManager};

/// Fallback memtable budget when the configured one is zero.
const DEFAULT_WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Fallback immutable queue capacity when the configured one is zero.
const DEFAULT_WRITE_BUFFER_NUMBER: usize = 2;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`Engine`] operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error originating from the table subsystem.
    #[error("SSTable error: {0}")]
    SSTable(#[from] SSTableError),

    /// Keys must be non-empty.
    #[error("Empty key")]
    EmptyKey,

    /// The engine was closed; only `close` itself stays callable.
    #[error("Engine is closed")]
    Closed,

    /// Internal invariant violation (poisoned lock, unexpected state).
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Counters
// ------------------------------------------------------------------------------------------------

/// Monotonic operation counters, readable at any time without a lock.
#[derive(Debug, Default)]
struct Counters {
    write_bytes: AtomicU64,
    read_bytes: AtomicU64,
    write_ops: AtomicU64,
    read_ops: AtomicU64,
}

/// Snapshot of engine occupancy returned by [`Engine::stats`].
#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    /// Payload bytes currently in the active memtable.
    pub active_bytes: usize,
    /// Sealed memtables waiting for the flusher.
    pub immutable_count: usize,
    /// Tables published on disk.
    pub table_count: usize,
}

/// Snapshot of the engine's traffic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCounters {
    /// Payload bytes accepted by `put` / `delete`.
    pub write_bytes: u64,
    /// Payload bytes returned by successful `get`s.
    pub read_bytes: u64,
    /// Number of `put` / `delete` calls accepted.
    pub write_ops: u64,
    /// Number of `get` calls served (hit or miss).
    pub read_ops: u64,
}

// ------------------------------------------------------------------------------------------------
// Engine Core
// ------------------------------------------------------------------------------------------------

/// State protected by the engine mutex.
struct EngineState {
    /// The memtable accepting writes.
    active: Memtable,

    /// Sealed memtables, front oldest, back newest. Bounded by the
    /// configured queue capacity through backpressure.
    immutable: VecDeque<Memtable>,

    /// True from the instant the flusher pops a memtable until its table
    /// is published. Barrier completion needs it: an empty queue alone
    /// does not mean the data is on disk.
    flush_in_progress: bool,
}

struct EngineInner {
    state: Mutex<EngineState>,

    /// Wakes the flusher: queue non-empty or shutdown.
    flush_cv: Condvar,

    /// Wakes writers blocked on a saturated queue.
    backpressure_cv: Condvar,

    /// Wakes barrier waiters: queue empty and no flush in flight.
    barrier_cv: Condvar,

    /// Set once by `close`; the flusher drains and exits.
    shutting_down: AtomicBool,

    /// Set when `close` completes; all operations fail afterwards.
    closed: AtomicBool,

    /// Everything on disk.
    manager: SSTableManager,

    /// One large serialization buffer shared by the flusher and the final
    /// synchronous drain, reused across flushes.
    flush_buf: Mutex<Vec<u8>>,

    /// Flusher join handle, taken exactly once by `close`.
    flusher: Mutex<Option<JoinHandle<()>>>,

    counters: Counters,

    memtable_budget: usize,
    queue_capacity: usize,

    db_path: PathBuf,
    fsync_dir_on_close: bool,
}

/// The storage engine handle.
///
/// Cheap to clone; all clones share the same engine. The engine stays open
/// until [`Engine::close`] is called — dropping the last handle without a
/// close loses whatever was not yet flushed (the documented no-WAL
/// contract), so callers are expected to close explicitly.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Opens (or creates) an engine rooted at `db_path`.
    ///
    /// With `overwrite` the directory is removed first. Otherwise existing
    /// tables are recovered and remain readable; new table ids continue
    /// above the highest recovered id.
    pub fn open(
        db_path: impl AsRef<Path>,
        overwrite: bool,
        config: &StoreConfig,
    ) -> Result<Self, EngineError> {
        let db_path = db_path.as_ref().to_path_buf();

        if overwrite && db_path.exists() {
            fs::remove_dir_all(&db_path)?;
        }
        fs::create_dir_all(&db_path)?;

        let memtable_budget = if config.write_buffer_size > 0 {
            config.write_buffer_size
        } else {
            DEFAULT_WRITE_BUFFER_SIZE
        };
        let queue_capacity = if config.write_buffer_number > 0 {
            config.write_buffer_number
        } else {
            DEFAULT_WRITE_BUFFER_NUMBER
        };
        let pre_allocation_size = if config.pre_allocate {
            memtable_budget as u64
        } else {
            0
        };

        let manager = SSTableManager::open(&db_path, config.file_pool_size.max(1), pre_allocation_size)?;

        let inner = Arc::new(EngineInner {
            state: Mutex::new(EngineState {
                active: Memtable::new(),
                immutable: VecDeque::new(),
                flush_in_progress: false,
            }),
            flush_cv: Condvar::new(),
            backpressure_cv: Condvar::new(),
            barrier_cv: Condvar::new(),
            shutting_down: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            manager,
            flush_buf: Mutex::new(Vec::with_capacity(DEFAULT_WRITE_BUFFER_SIZE)),
            flusher: Mutex::new(None),
            counters: Counters::default(),
            memtable_budget,
            queue_capacity,
            db_path: db_path.clone(),
            fsync_dir_on_close: config.fsync_dir_on_close,
        });

        let flusher_inner = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("blobcask-flusher".into())
            .spawn(move || flush_loop(&flusher_inner))?;
        *lock_plain(&inner.flusher)? = Some(handle);

        info!(
            path = %db_path.display(),
            memtable_budget,
            queue_capacity,
            "engine opened"
        );

        Ok(Self { inner })
    }

    /// Inserts a key-value pair.
    ///
    /// Visible to subsequent `get`s immediately; durable only after the
    /// next successful [`Engine::write_barrier`]. `flush_hint` is advisory
    /// at this layer — the store façade may turn it into a barrier.
    pub fn put(&self, key: &[u8], value: &[u8], flush_hint: bool) -> Result<(), EngineError> {
        let _ = flush_hint;
        self.write_record(key, value)
    }

    /// Deletes a key by writing the tombstone sentinel.
    pub fn delete(&self, key: &[u8], flush_hint: bool) -> Result<(), EngineError> {
        let _ = flush_hint;
        self.write_record(key, TOMBSTONE)
    }

    /// Point lookup with newest-first resolution: active memtable, sealed
    /// memtables newest-to-oldest, then the tables on disk. The first hit
    /// decides — a tombstone hit reports not-found.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        self.fail_if_closed()?;

        self.inner.counters.read_ops.fetch_add(1, Ordering::Relaxed);

        let found: Option<Vec<u8>> = {
            let state = self.lock_state()?;

            state
                .active
                .get(key)
                .or_else(|| {
                    state
                        .immutable
                        .iter()
                        .rev()
                        .find_map(|memtable| memtable.get(key))
                })
                .map(<[u8]>::to_vec)
        };

        // The lock is dropped before touching the disk layer; table reads
        // must never stall writers.
        let found = match found {
            Some(value) => Some(value),
            None => self.inner.manager.get(key),
        };

        match found {
            Some(value) if value != TOMBSTONE => {
                self.inner
                    .counters
                    .read_bytes
                    .fetch_add(value.len() as u64, Ordering::Relaxed);
                Ok(Some(value))
            }
            _ => Ok(None),
        }
    }

    /// Returns every live key starting with `prefix`, ascending, with
    /// newest-wins resolution and tombstone suppression across all layers.
    pub fn get_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, EngineError> {
        self.fail_if_closed()?;

        let mut results: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        let mut deleted: BTreeSet<Vec<u8>> = BTreeSet::new();

        {
            let state = self.lock_state()?;

            // Memtable layers oldest to newest: each scan overwrites what
            // older layers left, so the newest record ends up winning.
            for memtable in &state.immutable {
                memtable.scan(prefix, &mut results, &mut deleted);
            }
            state.active.scan(prefix, &mut results, &mut deleted);
        }

        // Disk layer last; it only fills keys no memtable claimed.
        self.inner.manager.scan(prefix, &mut results, &mut deleted);

        self.inner
            .counters
            .read_ops
            .fetch_add(1, Ordering::Relaxed);

        Ok(results.into_iter().collect())
    }

    /// Seals the active memtable (if non-empty) and waits until every
    /// sealed memtable has been flushed to disk.
    ///
    /// When this returns, every write issued before the call began is as
    /// durable as a closed file makes it.
    pub fn write_barrier(&self) -> Result<(), EngineError> {
        self.fail_if_closed()?;

        let mut state = self.lock_state()?;

        if !state.active.is_empty() {
            let sealed = std::mem::take(&mut state.active);
            state.immutable.push_back(sealed);
            self.inner.flush_cv.notify_one();
        }

        while !(state.immutable.is_empty() && !state.flush_in_progress) {
            state = self.wait_barrier(state)?;
        }

        Ok(())
    }

    /// No-op. Remote-aggregation collaborators issue read barriers
    /// symmetrically; the local engine has nothing to wait for.
    pub fn read_barrier(&self) -> Result<(), EngineError> {
        self.fail_if_closed()?;
        Ok(())
    }

    /// Snapshot of engine occupancy.
    pub fn stats(&self) -> Result<EngineStats, EngineError> {
        let state = self.lock_state()?;
        Ok(EngineStats {
            active_bytes: state.active.size_bytes(),
            immutable_count: state.immutable.len(),
            table_count: self.inner.manager.table_count(),
        })
    }

    /// Snapshot of the traffic counters.
    pub fn counters(&self) -> EngineCounters {
        EngineCounters {
            write_bytes: self.inner.counters.write_bytes.load(Ordering::Relaxed),
            read_bytes: self.inner.counters.read_bytes.load(Ordering::Relaxed),
            write_ops: self.inner.counters.write_ops.load(Ordering::Relaxed),
            read_ops: self.inner.counters.read_ops.load(Ordering::Relaxed),
        }
    }

    /// Shuts the engine down. Idempotent.
    ///
    /// Joins the flusher, drains whatever is still in memory by flushing
    /// synchronously on the calling thread, then releases the table
    /// manager's background workers.
    pub fn close(&self) -> Result<(), EngineError> {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Wake the flusher so it observes the shutdown flag.
        self.inner.flush_cv.notify_all();

        let handle = lock_plain(&self.inner.flusher)?.take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("flusher thread panicked");
            }
        }

        // No flusher remains: drain the leftovers on this thread.
        let mut state = self.lock_state()?;
        if !state.active.is_empty() {
            let sealed = std::mem::take(&mut state.active);
            state.immutable.push_back(sealed);
        }
        while let Some(memtable) = state.immutable.pop_front() {
            drop(state);

            let mut buf = lock_plain(&self.inner.flush_buf)?;
            if let Err(e) = self.inner.manager.flush_memtable(&memtable, &mut buf) {
                error!(error = %e, "final drain lost a memtable");
            }
            drop(buf);

            state = self.lock_state()?;
        }
        drop(state);

        self.inner.manager.close();
        self.inner.closed.store(true, Ordering::SeqCst);

        // Release anything still parked on the queue or a barrier.
        self.inner.backpressure_cv.notify_all();
        self.inner.barrier_cv.notify_all();

        if self.inner.fsync_dir_on_close {
            match fs::File::open(&self.inner.db_path) {
                Ok(dir) => {
                    if let Err(e) = dir.sync_all() {
                        warn!(error = %e, "db directory fsync failed");
                    }
                }
                Err(e) => warn!(error = %e, "db directory fsync failed"),
            }
        }

        info!(path = %self.inner.db_path.display(), "engine closed");
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Internals
    // --------------------------------------------------------------------------------------------

    fn write_record(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        self.fail_if_closed()?;
        if key.is_empty() {
            return Err(EngineError::EmptyKey);
        }

        let entry_size = key.len() + value.len();
        let mut state = self.lock_state()?;

        // Re-checked under the lock: `close` raises the flag before it
        // drains, so no write can slip into a memtable the drain already
        // passed over.
        self.fail_if_closed()?;

        if state.active.size_bytes() + entry_size > self.inner.memtable_budget
            && !state.active.is_empty()
        {
            // Backpressure: hold the writer until the flusher makes room.
            while state.immutable.len() >= self.inner.queue_capacity {
                state = self.wait_backpressure(state)?;
                self.fail_if_closed()?;
            }

            // Another writer may have rotated while we waited.
            if !state.active.is_empty() {
                let sealed = std::mem::take(&mut state.active);
                debug!(
                    bytes = sealed.size_bytes(),
                    records = sealed.count(),
                    queued = state.immutable.len() + 1,
                    "memtable rotated"
                );
                state.immutable.push_back(sealed);
                self.inner.flush_cv.notify_one();
            }
        }

        state.active.add(key, value);
        drop(state);

        self.inner
            .counters
            .write_bytes
            .fetch_add(entry_size as u64, Ordering::Relaxed);
        self.inner
            .counters
            .write_ops
            .fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    fn fail_if_closed(&self) -> Result<(), EngineError> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        Ok(())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, EngineState>, EngineError> {
        self.inner
            .state
            .lock()
            .map_err(|_| EngineError::Internal("engine state mutex poisoned".into()))
    }

    fn wait_backpressure<'a>(
        &self,
        guard: MutexGuard<'a, EngineState>,
    ) -> Result<MutexGuard<'a, EngineState>, EngineError> {
        self.inner
            .backpressure_cv
            .wait(guard)
            .map_err(|_| EngineError::Internal("engine state mutex poisoned".into()))
    }

    fn wait_barrier<'a>(
        &self,
        guard: MutexGuard<'a, EngineState>,
    ) -> Result<MutexGuard<'a, EngineState>, EngineError> {
        self.inner
            .barrier_cv
            .wait(guard)
            .map_err(|_| EngineError::Internal("engine state mutex poisoned".into()))
    }
}

// ------------------------------------------------------------------------------------------------
// Flusher
// ------------------------------------------------------------------------------------------------

/// The background flush loop.
///
/// Waits for sealed memtables, flushes them outside the state lock, and
/// broadcasts backpressure relief (after the pop) and barrier completion
/// (after the publish). Flush failures are logged and the memtable is
/// abandoned — the engine keeps running in a degraded but consistent
/// state.
fn flush_loop(inner: &EngineInner) {
    loop {
        let memtable = {
            let mut state = match inner.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };

            loop {
                if inner.shutting_down.load(Ordering::SeqCst) && state.immutable.is_empty() {
                    return;
                }
                if !state.immutable.is_empty() {
                    break;
                }
                state = match inner.flush_cv.wait(state) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }

            let memtable = state
                .immutable
                .pop_front()
                .unwrap_or_else(Memtable::new);
            state.flush_in_progress = true;
            memtable
        };

        // Writers blocked on a full queue can move again; barrier waiters
        // re-check and keep waiting on flush_in_progress.
        inner.backpressure_cv.notify_all();

        {
            let mut buf = match inner.flush_buf.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Err(e) = inner.manager.flush_memtable(&memtable, &mut buf) {
                error!(
                    bytes = memtable.size_bytes(),
                    records = memtable.count(),
                    error = %e,
                    "flush failed, memtable abandoned"
                );
            }
        }

        let mut state = match inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.flush_in_progress = false;
        drop(state);

        inner.barrier_cv.notify_all();
    }
}

/// Locks an auxiliary mutex (not the state mutex), mapping poisoning to an
/// internal error.
fn lock_plain<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, EngineError> {
    mutex
        .lock()
        .map_err(|_| EngineError::Internal("engine mutex poisoned".into()))
}
