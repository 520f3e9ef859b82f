//! # Memtable Module
//!
//! ## Design Invariants
//!
//! - The memtable is a plain **append log**: `add` never sorts, merges, or
//!   deduplicates. Multiple versions of a key may coexist; the newest
//!   occurrence (highest position in the log) is authoritative.
//! - `size_bytes` is exact — the sum of `key.len() + value.len()` over every
//!   record ever appended, superseded records included — and only ever grows
//!   until the memtable is dropped.
//! - Deletes are represented by appending the [`TOMBSTONE`] sentinel as the
//!   value, never by physical removal.
//!
//! ## Rationale
//!
//! The dominant workload is `put`. A linear append beats any sorted
//! structure on the write path and the read-side cost is bounded: a reverse
//! scan never visits more bytes than the rotation budget allows.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::{BTreeMap, BTreeSet};

// ------------------------------------------------------------------------------------------------
// Tombstone sentinel
// ------------------------------------------------------------------------------------------------

/// Sentinel value marking a logical deletion.
///
/// A record whose value equals this byte string is a delete marker, in
/// memory and on disk alike. Live writes must never use this exact byte
/// string as a value.
pub const TOMBSTONE: &[u8] = b"__LSM_TOMBSTONE_v1__";

// ------------------------------------------------------------------------------------------------
// Memtable Core
// ------------------------------------------------------------------------------------------------

/// The in-memory write buffer of the storage engine.
///
/// Owned exclusively by the engine while active; once rotated into the
/// immutable queue it is only read (by lookups and by the flusher) and
/// never mutated again. All synchronization lives in the engine — the
/// memtable itself is single-writer by construction.
#[derive(Debug, Default)]
pub struct Memtable {
    /// Append log of `(key, value)` records, oldest first.
    data: Vec<(Vec<u8>, Vec<u8>)>,

    /// Exact accumulated payload size in bytes.
    size_bytes: usize,
}

impl Memtable {
    /// Creates an empty memtable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record. Infallible, O(1) amortized.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        self.size_bytes += key.len() + value.len();
        self.data.push((key.to_vec(), value.to_vec()));
    }

    /// Returns the value of the newest occurrence of `key`, if any.
    ///
    /// A tombstoned key is reported as a hit with the [`TOMBSTONE`] value —
    /// distinguishing deletion from absence is the caller's job, since a
    /// tombstone here must shadow older layers.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.data
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Scans the log in append order, folding every record whose key starts
    /// with `prefix` into `results` / `deleted` with newest-wins semantics.
    ///
    /// A live value lands in `results` and revokes any earlier tombstone; a
    /// tombstone lands in `deleted` and revokes any earlier value. Forward
    /// order makes the *last* occurrence win without extra bookkeeping.
    pub fn scan(
        &self,
        prefix: &[u8],
        results: &mut BTreeMap<Vec<u8>, Vec<u8>>,
        deleted: &mut BTreeSet<Vec<u8>>,
    ) {
        for (key, value) in &self.data {
            if !key.starts_with(prefix) {
                continue;
            }
            if value == TOMBSTONE {
                results.remove(key);
                deleted.insert(key.clone());
            } else {
                deleted.remove(key);
                results.insert(key.clone(), value.clone());
            }
        }
    }

    /// Accumulated payload bytes, superseded records included.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Number of records in the log.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// True if nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The append log in insertion order. Used by the flusher to serialize
    /// the memtable out as a table.
    pub fn data(&self) -> &[(Vec<u8>, Vec<u8>)] {
        &self.data
    }
}
