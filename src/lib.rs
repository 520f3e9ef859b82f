//! # Blobcask
//!
//! An embeddable, persistent key-value store for **write-dominant
//! keyed-blob streams** — many writers appending opaque byte blobs under
//! opaque byte keys, with durability synchronized at explicit barriers
//! rather than per write.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                         Engine                             │
//! │  ┌────────────┐   ┌──────────────┐   ┌─────────────────┐  │
//! │  │   Active    │   │  Immutable   │   │  L0 tables      │  │
//! │  │  memtable   │──►│   queue      │──►│  + per-table    │  │
//! │  │             │   │ (bounded)    │   │  indices (disk) │  │
//! │  └─────────────┘   └──────────────┘   └─────────────────┘  │
//! │       rotate          flusher thread        lock-free      │
//! │                                             index list     │
//! │  ┌──────────────┐   ┌──────────────┐                       │
//! │  │  File pool   │   │ File closer  │   background workers  │
//! │  │ (pre-create) │   │ (batch sync) │                       │
//! │  └──────────────┘   └──────────────┘                       │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`store`] | Backend-independent `Store` trait, metadata namespace, `open` |
//! | [`engine`] | The native engine — memtable queue, flusher, barriers, counters |
//! | [`sstable`] | On-disk tables, Bitcask-style indices, recovery |
//! | [`memtable`] | Append-log write buffer |
//! | [`file_pool`] | Background pre-creation of numbered table files |
//! | [`file_closer`] | Batched background fsync + close |
//! | [`config`] | Tunables and validation |
//! | [`bench`] | Measurement harness with the contractual bandwidth formula |
//!
//! ## Durability model
//!
//! There is **no write-ahead log**. Writes are visible immediately and
//! become durable when a `write_barrier` completes (or at `close`). This
//! is the intended trade for stream-style workloads where the producer can
//! replay an epoch: the barrier at the end of an epoch is the commit
//! point, and everything between barriers is cheap.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use blobcask::{Store, StoreConfig, open};
//!
//! let store = open("/tmp/my_db", true, StoreConfig::default()).unwrap();
//!
//! store.put(b"variable/pressure", b"blob-bytes", false).unwrap();
//! assert_eq!(
//!     store.get(b"variable/pressure").unwrap(),
//!     Some(b"blob-bytes".to_vec()),
//! );
//!
//! // Durability point: everything written above is on disk after this.
//! store.write_barrier().unwrap();
//!
//! store.delete(b"variable/pressure", false).unwrap();
//! store.close().unwrap();
//! ```

pub mod bench;
pub mod config;
pub mod engine;
pub mod file_closer;
pub mod file_pool;
pub mod memtable;
pub mod sstable;
pub mod store;

pub use bench::{BenchError, Benchmark, IterationSummary};
pub use config::{ConfigError, StorageType, StoreConfig};
pub use engine::{Engine, EngineCounters, EngineError, EngineStats};
pub use memtable::TOMBSTONE;
pub use store::{META_PREFIX, NativeStore, Store, StoreError, open};
