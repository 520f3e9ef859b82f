//! # SSTable Module
//!
//! Immutable on-disk tables and the in-memory indices that make them
//! searchable.
//!
//! ## On-disk layout
//!
//! A table is a bare concatenation of records in memtable append order —
//! **not** sorted:
//!
//! ```text
//! [u32 key_len LE][key bytes][u32 val_len LE][value bytes]
//! [u32 key_len LE][key bytes][u32 val_len LE][value bytes]
//! ...
//! ```
//!
//! Tables are named `L0-NNNNNN.sst` inside the db directory, `NNNNNN` a
//! six-digit zero-padded id that increases monotonically across the whole
//! lifetime of the database. A table is written exactly once, by the
//! flusher, and never modified afterwards.
//!
//! ## Bitcask-style indices
//!
//! Sorting happens in memory instead: every table gets an [`L0Index`] — a
//! key-sorted vector of `(key, file_offset)` pairs with one entry per key,
//! the offset of the *latest* occurrence within that table. A point lookup
//! is a binary search plus a single positioned read.
//!
//! ## The index list
//!
//! Indices live in a lock-free singly-linked list, newest table at the
//! head. Flushes prepend with a compare-and-swap loop; readers load the
//! head with `Acquire` and traverse without any lock, so lookups never
//! serialize behind a flush. Nodes are only reclaimed when the manager
//! itself drops, which is what makes the unguarded traversal sound.
//!
//! ## Recovery
//!
//! On a cold open the directory is scanned for `L0-NNNNNN.sst` files in
//! ascending id order and each is walked to rebuild its index. A torn
//! trailing record (crash mid-flush) ends the walk for that file; the
//! records before it stay visible.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicPtr, Ordering};

use memmap2::Mmap;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::file_closer::{FileCloser, FileCloserError};
use crate::file_pool::{FilePool, FilePoolError};
use crate::memtable::{Memtable, TOMBSTONE};

/// Table file name prefix.
pub const TABLE_PREFIX: &str = "L0-";

/// Table file name suffix.
pub const TABLE_SUFFIX: &str = ".sst";

const U32_SIZE: usize = std::mem::size_of::<u32>();

/// Write the reuse buffer out once it holds this many bytes.
const FLUSH_CHUNK_BYTES: usize = 1024 * 1024;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`SSTableManager`] operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SSTableError {
    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file pool refused to hand out a table file.
    #[error("File pool error: {0}")]
    Pool(#[from] FilePoolError),

    /// Failed to start the file closer.
    #[error("File closer error: {0}")]
    Closer(#[from] FileCloserError),

    /// The manager was already closed.
    #[error("SSTable manager is closed")]
    Closed,

    /// Internal consistency or locking error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// L0Index
// ------------------------------------------------------------------------------------------------

/// In-memory index of one on-disk table.
///
/// After construction `offsets` is sorted by key ascending and holds each
/// key at most once — the offset of the newest occurrence within the file,
/// which is the one that must win on lookup.
#[derive(Debug)]
pub struct L0Index {
    /// Path of the table this index describes.
    pub path: PathBuf,

    /// `(key, file offset)` pairs, sorted, deduplicated.
    pub offsets: Vec<(Vec<u8>, u64)>,
}

/// One link of the lock-free index list.
struct IndexNode {
    index: L0Index,

    /// Next-older node, or null at the tail. Written only before the node
    /// is published by the CAS; read-only afterwards.
    next: *mut IndexNode,
}

// ------------------------------------------------------------------------------------------------
// SSTableManager Core
// ------------------------------------------------------------------------------------------------

/// Owner of everything on-disk: table files, their indices, the file pool
/// that pre-creates table files, and the closer that retires them.
#[derive(Debug)]
pub struct SSTableManager {
    db_dir: PathBuf,

    /// Head of the index list; the newest table. Null when no tables exist.
    head: AtomicPtr<IndexNode>,

    /// Background file pre-creation. `None` once closed.
    pool: Mutex<Option<FilePool>>,

    /// Background batched close. `None` once closed.
    closer: Mutex<Option<FileCloser>>,
}

impl std::fmt::Debug for IndexNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexNode")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl SSTableManager {
    /// Opens the manager over `db_dir`: rebuilds indices for every existing
    /// table, then starts the file pool right after the highest recovered
    /// id and a closer sized to the pool.
    pub fn open(
        db_dir: impl AsRef<Path>,
        pool_size: usize,
        pre_allocation_size: u64,
    ) -> Result<Self, SSTableError> {
        let db_dir = db_dir.as_ref().to_path_buf();

        let manager = Self {
            db_dir: db_dir.clone(),
            head: AtomicPtr::new(std::ptr::null_mut()),
            pool: Mutex::new(None),
            closer: Mutex::new(None),
        };

        let max_id = manager.recover()?;

        let pool = FilePool::new(
            &db_dir,
            TABLE_PREFIX,
            TABLE_SUFFIX,
            pool_size,
            max_id + 1,
            pre_allocation_size,
        )?;
        let closer = FileCloser::new(pool_size.max(1))?;

        *lock_or_recover(&manager.pool) = Some(pool);
        *lock_or_recover(&manager.closer) = Some(closer);

        Ok(manager)
    }

    /// Serializes a memtable out as one new table and publishes its index.
    ///
    /// `buf` is the caller-owned serialization buffer, reused across
    /// flushes so sustained flushing does not reallocate. An empty memtable
    /// succeeds without acquiring a file.
    pub fn flush_memtable(&self, memtable: &Memtable, buf: &mut Vec<u8>) -> Result<(), SSTableError> {
        if memtable.is_empty() {
            return Ok(());
        }

        let mut pooled = {
            let guard = lock_or_recover(&self.pool);
            let pool = guard.as_ref().ok_or(SSTableError::Closed)?;
            pool.acquire()?
        };

        let mut offsets: Vec<(Vec<u8>, u64)> = Vec::with_capacity(memtable.count());
        let mut offset: u64 = 0;

        buf.clear();
        for (key, value) in memtable.data() {
            offsets.push((key.clone(), offset));
            offset += (2 * U32_SIZE + key.len() + value.len()) as u64;

            frame_record(buf, key, value);
            if buf.len() >= FLUSH_CHUNK_BYTES {
                pooled.file.write_all(buf)?;
                buf.clear();
            }
        }
        if !buf.is_empty() {
            pooled.file.write_all(buf)?;
            buf.clear();
        }

        {
            let guard = lock_or_recover(&self.closer);
            let closer = guard.as_ref().ok_or(SSTableError::Closed)?;
            closer.schedule_close(pooled.file);
        }

        sort_and_dedupe(&mut offsets);

        debug!(
            path = %pooled.path.display(),
            records = memtable.count(),
            keys = offsets.len(),
            bytes = offset,
            "memtable flushed to table"
        );

        self.prepend(L0Index {
            path: pooled.path,
            offsets,
        });

        Ok(())
    }

    /// Point lookup, newest table first.
    ///
    /// One binary search per index and a single positioned read for the
    /// first index that knows the key. Read failures are logged and treated
    /// as a miss for that table so a damaged file cannot take down reads.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut curr = self.head.load(Ordering::Acquire);

        while !curr.is_null() {
            // SAFETY: nodes are published fully initialized and are never
            // freed before the manager itself drops; `&self` keeps the
            // manager alive for the whole traversal.
            let node = unsafe { &*curr };

            let offsets = &node.index.offsets;
            if let Ok(pos) = offsets.binary_search_by(|(k, _)| k.as_slice().cmp(key)) {
                match read_record_at(&node.index.path, offsets[pos].1, key) {
                    Ok(Some(value)) => return Some(value),
                    Ok(None) => {
                        // Key echo mismatch was already logged; fall through
                        // to older tables.
                    }
                    Err(e) => {
                        error!(
                            path = %node.index.path.display(),
                            offset = offsets[pos].1,
                            error = %e,
                            "table read failed"
                        );
                    }
                }
            }

            curr = node.next;
        }

        None
    }

    /// Prefix scan over all tables, newest first.
    ///
    /// A key already present in `results` or `deleted` was claimed by a
    /// newer layer and is skipped — first layer wins. Returns whether any
    /// live key was contributed.
    pub fn scan(
        &self,
        prefix: &[u8],
        results: &mut BTreeMap<Vec<u8>, Vec<u8>>,
        deleted: &mut BTreeSet<Vec<u8>>,
    ) -> bool {
        let mut found_any = false;
        let mut curr = self.head.load(Ordering::Acquire);

        while !curr.is_null() {
            // SAFETY: same lifetime argument as in `get`.
            let node = unsafe { &*curr };

            let offsets = &node.index.offsets;
            let start = offsets.partition_point(|(k, _)| k.as_slice() < prefix);

            for (key, offset) in &offsets[start..] {
                if !key.starts_with(prefix) {
                    break;
                }
                if results.contains_key(key) || deleted.contains(key) {
                    continue;
                }

                match read_record_at(&node.index.path, *offset, key) {
                    Ok(Some(value)) => {
                        if value == TOMBSTONE {
                            deleted.insert(key.clone());
                        } else {
                            results.insert(key.clone(), value);
                            found_any = true;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(
                            path = %node.index.path.display(),
                            offset,
                            error = %e,
                            "table read failed during scan"
                        );
                    }
                }
            }

            curr = node.next;
        }

        found_any
    }

    /// Number of published indices. Intended for observability and tests.
    pub fn table_count(&self) -> usize {
        let mut count = 0;
        let mut curr = self.head.load(Ordering::Acquire);
        while !curr.is_null() {
            // SAFETY: same lifetime argument as in `get`.
            curr = unsafe { &*curr }.next;
            count += 1;
        }
        count
    }

    /// Releases the file pool and closer.
    ///
    /// The caller must guarantee no flush is in flight. The closer goes
    /// first so every written table is fsynced before the pool abandons its
    /// pre-created spares.
    pub fn close(&self) {
        lock_or_recover(&self.closer).take();
        lock_or_recover(&self.pool).take();
    }

    // --------------------------------------------------------------------------------------------
    // Internals
    // --------------------------------------------------------------------------------------------

    /// Publishes `index` as the new head of the list.
    fn prepend(&self, index: L0Index) {
        let node = Box::into_raw(Box::new(IndexNode {
            index,
            next: std::ptr::null_mut(),
        }));

        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: `node` is unpublished until the CAS below succeeds,
            // so this thread still has exclusive access to it.
            unsafe { (*node).next = head };

            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => head = actual,
            }
        }
    }

    /// Scans the db directory and rebuilds one index per table file, oldest
    /// first so that after prepending the head is the newest table.
    /// Returns the highest id seen.
    fn recover(&self) -> Result<u64, SSTableError> {
        let mut found: Vec<(u64, PathBuf)> = Vec::new();

        for entry in std::fs::read_dir(&self.db_dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(id) = name
                .strip_prefix(TABLE_PREFIX)
                .and_then(|s| s.strip_suffix(TABLE_SUFFIX))
                .and_then(|s| s.parse::<u64>().ok())
            else {
                continue;
            };
            found.push((id, path));
        }

        found.sort_by_key(|(id, _)| *id);
        let max_id = found.last().map(|(id, _)| *id).unwrap_or(0);

        if !found.is_empty() {
            info!(tables = found.len(), "recovering table indices");
        }

        for (id, path) in found {
            let mut offsets = match build_index_from_table(&path) {
                Ok(offsets) => offsets,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "table unreadable, skipped");
                    continue;
                }
            };
            sort_and_dedupe(&mut offsets);

            debug!(id, path = %path.display(), keys = offsets.len(), "table index rebuilt");
            self.prepend(L0Index { path, offsets });
        }

        Ok(max_id)
    }

    /// Clones every index's offsets, newest table first. Test support.
    #[cfg(test)]
    pub(crate) fn index_snapshot(&self) -> Vec<Vec<(Vec<u8>, u64)>> {
        let mut snapshot = Vec::new();
        let mut curr = self.head.load(Ordering::Acquire);
        while !curr.is_null() {
            // SAFETY: same lifetime argument as in `get`.
            let node = unsafe { &*curr };
            snapshot.push(node.index.offsets.clone());
            curr = node.next;
        }
        snapshot
    }
}

impl Drop for SSTableManager {
    fn drop(&mut self) {
        let mut curr = *self.head.get_mut();
        while !curr.is_null() {
            // SAFETY: `&mut self` proves no reader can be traversing; every
            // node was created by `Box::into_raw` in `prepend`.
            let node = unsafe { Box::from_raw(curr) };
            curr = node.next;
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Record framing
// ------------------------------------------------------------------------------------------------

/// Appends one framed record to `buf`.
fn frame_record(buf: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value);
}

/// Reads the record at `offset` and returns its value.
///
/// The key stored in the file is compared against `expected_key`; a
/// mismatch means the index and the file disagree, which is logged and
/// reported as `None` rather than returning wrong data.
fn read_record_at(path: &Path, offset: u64, expected_key: &[u8]) -> io::Result<Option<Vec<u8>>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut len_buf = [0u8; U32_SIZE];
    file.read_exact(&mut len_buf)?;
    let key_len = u32::from_le_bytes(len_buf) as usize;

    let mut key = vec![0u8; key_len];
    file.read_exact(&mut key)?;

    if key != expected_key {
        warn!(
            path = %path.display(),
            offset,
            "index points at a different key"
        );
        return Ok(None);
    }

    file.read_exact(&mut len_buf)?;
    let val_len = u32::from_le_bytes(len_buf) as usize;

    let mut value = vec![0u8; val_len];
    file.read_exact(&mut value)?;

    Ok(Some(value))
}

/// Walks a table file and collects `(key, offset)` for every complete
/// record.
///
/// The walk stops at the first record that runs past end-of-file (a crash
/// left it torn) and at a zero key length (the zero-filled tail of a
/// pre-allocated file — keys are never empty).
fn build_index_from_table(path: &Path) -> io::Result<Vec<(Vec<u8>, u64)>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len() as usize;
    if len == 0 {
        return Ok(Vec::new());
    }

    // SAFETY: table files are write-once and closed before recovery runs;
    // nothing mutates the mapping underneath us.
    let map = unsafe { Mmap::map(&file)? };

    let mut offsets = Vec::new();
    let mut pos: usize = 0;

    while pos + U32_SIZE <= len {
        let key_len = read_u32_le(&map, pos) as usize;
        if key_len == 0 {
            break;
        }

        let key_end = pos + U32_SIZE + key_len;
        if key_end + U32_SIZE > len {
            break;
        }

        let val_len = read_u32_le(&map, key_end) as usize;
        let record_end = key_end + U32_SIZE + val_len;
        if record_end > len {
            break;
        }

        offsets.push((map[pos + U32_SIZE..key_end].to_vec(), pos as u64));
        pos = record_end;
    }

    Ok(offsets)
}

fn read_u32_le(bytes: &[u8], pos: usize) -> u32 {
    let mut raw = [0u8; U32_SIZE];
    raw.copy_from_slice(&bytes[pos..pos + U32_SIZE]);
    u32::from_le_bytes(raw)
}

/// Sorts by key ascending with offset descending as tiebreak, then keeps
/// only the first entry of each key run — the largest offset, the record
/// written last.
fn sort_and_dedupe(offsets: &mut Vec<(Vec<u8>, u64)>) {
    offsets.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));
    offsets.dedup_by(|a, b| a.0 == b.0);
}

/// Locks a mutex, recovering the guard if a previous holder panicked. The
/// protected values stay consistent because every critical section is a
/// single assignment or read.
fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
