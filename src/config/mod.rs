//! # Configuration Module
//!
//! All tunables recognized by [`crate::store::open`], with their defaults.
//! Several options only matter to adapter backends wrapping third-party
//! engines; the native engine accepts and ignores them so one config type
//! serves every backend behind the [`crate::store::Store`] trait.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Configuration validation failures, surfaced at open time.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// `transfer_size` must be at least `block_size`.
    #[error("transfer_size ({transfer_size}) is smaller than block_size ({block_size})")]
    TransferSmallerThanBlock {
        transfer_size: usize,
        block_size: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// Storage backend selection
// ------------------------------------------------------------------------------------------------

/// Which engine implementation backs the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageType {
    /// The built-in log-structured engine.
    #[default]
    Native,

    /// Adapter over a LevelDB-style library.
    LevelDb,

    /// Adapter over a RocksDB-style library.
    RocksDb,
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StorageType::Native => "Native",
            StorageType::LevelDb => "LevelDB",
            StorageType::RocksDb => "RocksDB",
        };
        f.write_str(name)
    }
}

// ------------------------------------------------------------------------------------------------
// StoreConfig
// ------------------------------------------------------------------------------------------------

/// Configuration for a store instance. Every field has a usable default.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backend selection.
    pub storage_type: StorageType,

    /// Memtable byte budget before rotation. Zero falls back to the
    /// engine's built-in default.
    pub write_buffer_size: usize,

    /// Maximum sealed memtables queued for flush; writers block beyond
    /// this. Zero falls back to the engine's built-in default.
    pub write_buffer_number: usize,

    /// Target number of pre-created table files; also sizes the close
    /// batch.
    pub file_pool_size: usize,

    /// Reserve `write_buffer_size` bytes per table file at creation.
    pub pre_allocate: bool,

    /// Request synchronous writes. Adapter backends only.
    pub use_sync: bool,

    /// Block-cache size hint. Adapter backends only.
    pub cache_size: usize,

    /// Block size hint. Adapter backends only.
    pub block_size: usize,

    /// Transfer size hint; must be at least `block_size`.
    pub transfer_size: usize,

    /// Make every `put` / `delete` imply a write barrier at the store
    /// façade.
    pub always_flush: bool,

    /// Façade batching cap in operations. Adapter backends only.
    pub async_batch_size: usize,

    /// Façade batching cap in bytes. Adapter backends only.
    pub async_batch_bytes: usize,

    /// Fsync the db directory as the final step of `close`, pinning the
    /// directory entries of every table, not just their contents.
    pub fsync_dir_on_close: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Native,
            write_buffer_size: 64 * 1024 * 1024,
            write_buffer_number: 2,
            file_pool_size: 4,
            pre_allocate: false,
            use_sync: false,
            cache_size: 0,
            block_size: 512 * 1024,
            transfer_size: 512 * 1024,
            always_flush: false,
            async_batch_size: 64,
            async_batch_bytes: 16 * 1024 * 1024,
            fsync_dir_on_close: false,
        }
    }
}

impl StoreConfig {
    /// Checks cross-field constraints. Called by `open` before any engine
    /// is created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transfer_size < self.block_size {
            return Err(ConfigError::TransferSmallerThanBlock {
                transfer_size: self.transfer_size,
                block_size: self.block_size,
            });
        }
        Ok(())
    }
}
