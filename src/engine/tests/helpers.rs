use crate::config::StoreConfig;
use crate::engine::Engine;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing controlled by `RUST_LOG`. Safe to call repeatedly —
/// only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with a large write buffer — nothing rotates, everything stays in
/// the active memtable.
pub fn memtable_only_config() -> StoreConfig {
    init_tracing();
    StoreConfig {
        write_buffer_size: 64 * 1024 * 1024,
        ..StoreConfig::default()
    }
}

/// Config with a tiny write buffer so rotations and flushes happen after a
/// handful of writes.
pub fn small_buffer_config() -> StoreConfig {
    init_tracing();
    StoreConfig {
        write_buffer_size: 128,
        write_buffer_number: 2,
        file_pool_size: 2,
        ..StoreConfig::default()
    }
}

/// Open a fresh engine over `path` with the given config.
pub fn open_fresh(path: &Path, config: &StoreConfig) -> Engine {
    Engine::open(path, true, config).expect("open")
}

/// Reopen an existing engine without overwriting.
pub fn reopen(path: &Path, config: &StoreConfig) -> Engine {
    Engine::open(path, false, config).expect("reopen")
}
