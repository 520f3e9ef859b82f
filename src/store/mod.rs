//! # Store Façade
//!
//! The uniform contract every storage backend exposes, plus the reserved
//! metadata-key namespace layered on top of it.
//!
//! [`open`] is the crate's front door: it validates the configuration and
//! hands back a boxed [`Store`] for the selected backend. The native
//! engine is built in; the LevelDB-style and RocksDB-style adapters plug
//! into the same trait but ship separately, so selecting them here reports
//! [`StoreError::UnsupportedBackend`].
//!
//! ## Metadata namespace
//!
//! Keys starting with [`META_PREFIX`] are reserved for the `meta_*`
//! operations. User keys must avoid the prefix; a user prefix scan that
//! collides with it will see metadata keys — avoidance is documented, not
//! enforced.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, StorageType, StoreConfig};
use crate::engine::{Engine, EngineError};

/// Reserved prefix of the metadata-key namespace.
pub const META_PREFIX: &[u8] = b"__lsmio_md::";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`Store`] operations and [`open`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Error originating from the native engine.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// The configuration failed validation; no engine was created.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The selected backend is not compiled into this build.
    #[error("Storage backend {0} is not available")]
    UnsupportedBackend(StorageType),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// Store trait
// ------------------------------------------------------------------------------------------------

/// The backend-independent store contract.
///
/// The `flush` argument on mutations is a durability hint. How literally
/// it is taken is a backend decision — the native engine treats it as
/// advisory and relies on [`Store::write_barrier`] (or the `always_flush`
/// configuration) for durability.
pub trait Store: Send + Sync {
    /// Insert a key-value pair.
    fn put(&self, key: &[u8], value: &[u8], flush: bool) -> Result<(), StoreError>;

    /// Delete a key.
    fn delete(&self, key: &[u8], flush: bool) -> Result<(), StoreError>;

    /// Point lookup.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// All live keys starting with `prefix`, ascending.
    fn get_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Block until every write issued before this call is durable.
    fn write_barrier(&self) -> Result<(), StoreError>;

    /// Synchronization point for read-side collaborators.
    fn read_barrier(&self) -> Result<(), StoreError>;

    /// Shut the backend down. Idempotent.
    fn close(&self) -> Result<(), StoreError>;

    /// Remove the entire database directory. Returns whether anything was
    /// there to remove. Intended for use after `close`.
    fn cleanup(&self) -> Result<bool, StoreError>;

    /// Store a value under the reserved metadata namespace.
    fn meta_put(&self, key: &[u8], value: &[u8], flush: bool) -> Result<(), StoreError> {
        self.put(&meta_key(key), value, flush)
    }

    /// Look up a metadata key.
    fn meta_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.get(&meta_key(key))
    }

    /// All metadata entries whose key (after the namespace prefix) starts
    /// with `infix`. Returned keys carry the full prefix.
    fn meta_get_all(&self, infix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.get_prefix(&meta_key(infix))
    }
}

fn meta_key(key: &[u8]) -> Vec<u8> {
    [META_PREFIX, key].concat()
}

// ------------------------------------------------------------------------------------------------
// open
// ------------------------------------------------------------------------------------------------

/// Opens a store at `db_path` with the selected backend.
///
/// The configuration is validated first; an invalid configuration means no
/// engine is created at all.
pub fn open(
    db_path: impl AsRef<Path>,
    overwrite: bool,
    config: StoreConfig,
) -> Result<Box<dyn Store>, StoreError> {
    config.validate()?;

    info!(
        path = %db_path.as_ref().display(),
        backend = %config.storage_type,
        overwrite,
        "opening store"
    );

    match config.storage_type {
        StorageType::Native => Ok(Box::new(NativeStore::open(db_path, overwrite, config)?)),
        backend => Err(StoreError::UnsupportedBackend(backend)),
    }
}

// ------------------------------------------------------------------------------------------------
// NativeStore
// ------------------------------------------------------------------------------------------------

/// [`Store`] implementation backed by the built-in engine.
pub struct NativeStore {
    engine: Engine,
    db_path: PathBuf,

    /// Barrier after every mutation when set.
    always_flush: bool,

    /// Batching caps, owned here for parity with adapter backends. The
    /// native engine has no asynchronous batch path, so they are unused.
    max_batch_size: usize,
    max_batch_bytes: usize,
}

impl NativeStore {
    /// Opens the native engine under the façade.
    pub fn open(
        db_path: impl AsRef<Path>,
        overwrite: bool,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        let engine = Engine::open(&db_path, overwrite, &config)?;

        Ok(Self {
            engine,
            db_path: db_path.as_ref().to_path_buf(),
            always_flush: config.always_flush,
            max_batch_size: config.async_batch_size,
            max_batch_bytes: config.async_batch_bytes,
        })
    }

    /// Direct access to the underlying engine, for callers that need the
    /// counters or occupancy stats the trait does not carry.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The façade's batching caps `(max_ops, max_bytes)`.
    pub fn batch_limits(&self) -> (usize, usize) {
        (self.max_batch_size, self.max_batch_bytes)
    }
}

impl Store for NativeStore {
    fn put(&self, key: &[u8], value: &[u8], flush: bool) -> Result<(), StoreError> {
        self.engine.put(key, value, flush)?;
        if self.always_flush {
            self.engine.write_barrier()?;
        }
        Ok(())
    }

    fn delete(&self, key: &[u8], flush: bool) -> Result<(), StoreError> {
        self.engine.delete(key, flush)?;
        if self.always_flush {
            self.engine.write_barrier()?;
        }
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.engine.get(key)?)
    }

    fn get_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self.engine.get_prefix(prefix)?)
    }

    fn write_barrier(&self) -> Result<(), StoreError> {
        Ok(self.engine.write_barrier()?)
    }

    fn read_barrier(&self) -> Result<(), StoreError> {
        Ok(self.engine.read_barrier()?)
    }

    fn close(&self) -> Result<(), StoreError> {
        Ok(self.engine.close()?)
    }

    fn cleanup(&self) -> Result<bool, StoreError> {
        if self.db_path.exists() {
            debug!(path = %self.db_path.display(), "removing database directory");
            std::fs::remove_dir_all(&self.db_path)?;
            return Ok(true);
        }
        Ok(false)
    }
}
