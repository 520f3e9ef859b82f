//! # File Pool Module
//!
//! Background pre-creation of numbered output files.
//!
//! ## Design Overview
//!
//! Creating and (optionally) pre-allocating an output file is slow enough to
//! stall a flush. The pool moves that work off the flush path: a worker
//! thread keeps a bounded channel topped up with freshly created files, and
//! [`FilePool::acquire`] simply pops the next one.
//!
//! File names are `{prefix}{id:06}{suffix}` with a monotonically increasing
//! id. Ids are allocated by the worker alone, so two acquired files can
//! never share a name and successive acquisitions observe strictly
//! increasing ids.
//!
//! ## Shutdown
//!
//! Dropping the pool disconnects the channel, which both unparks a worker
//! blocked on a full channel and makes any concurrent `acquire` fail with
//! [`FilePoolError::ShutDown`]. Files already created but never acquired are
//! closed and left on disk; the next recovery pass counts their ids so the
//! sequence stays monotonic across restarts.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, bounded};
use thiserror::Error;
use tracing::{debug, error, info};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`FilePool`] operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FilePoolError {
    /// The pool was shut down while a caller waited for a file.
    #[error("File pool is shut down")]
    ShutDown,

    /// Failed to start the replenisher thread.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ------------------------------------------------------------------------------------------------
// Pooled file handle
// ------------------------------------------------------------------------------------------------

/// An output file handed out by the pool, positioned at offset 0.
#[derive(Debug)]
pub struct PooledFile {
    /// The id embedded in the file name.
    pub id: u64,

    /// Full path of the file on disk.
    pub path: PathBuf,

    /// Open handle, ready for writing.
    pub file: File,
}

// ------------------------------------------------------------------------------------------------
// FilePool Core
// ------------------------------------------------------------------------------------------------

/// Bounded pool of pre-created output files, replenished in the background.
#[derive(Debug)]
pub struct FilePool {
    /// Receiving side of the pool channel. `None` only mid-drop.
    rx: Option<Receiver<PooledFile>>,

    /// Signals the worker to stop replenishing.
    shutdown: Arc<AtomicBool>,

    /// Replenisher thread handle, joined on drop.
    worker: Option<JoinHandle<()>>,
}

impl FilePool {
    /// Starts a pool that keeps up to `pool_size` files named
    /// `{prefix}{id:06}{suffix}` ready inside `directory`, with ids counting
    /// up from `start_id`.
    ///
    /// When `pre_allocation_size` is non-zero, each file has that many bytes
    /// reserved at creation time before it enters the pool.
    pub fn new(
        directory: impl AsRef<Path>,
        prefix: &str,
        suffix: &str,
        pool_size: usize,
        start_id: u64,
        pre_allocation_size: u64,
    ) -> Result<Self, FilePoolError> {
        let (tx, rx) = bounded(pool_size.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = Replenisher {
            directory: directory.as_ref().to_path_buf(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            next_id: start_id,
            pre_allocation_size,
            tx,
            shutdown: Arc::clone(&shutdown),
        };

        let handle = thread::Builder::new()
            .name("blobcask-file-pool".into())
            .spawn(move || worker.run())?;

        info!(
            dir = %directory.as_ref().display(),
            pool_size,
            start_id,
            pre_allocation_size,
            "file pool started"
        );

        Ok(Self {
            rx: Some(rx),
            shutdown,
            worker: Some(handle),
        })
    }

    /// Pops the oldest pre-created file, blocking until one is available.
    ///
    /// The pop itself frees a channel slot, which is what wakes the worker
    /// to replenish. Fails only when the pool is shutting down.
    pub fn acquire(&self) -> Result<PooledFile, FilePoolError> {
        let rx = self.rx.as_ref().ok_or(FilePoolError::ShutDown)?;
        let pooled = rx.recv().map_err(|_| FilePoolError::ShutDown)?;

        debug!(id = pooled.id, path = %pooled.path.display(), "file acquired from pool");
        Ok(pooled)
    }
}

impl Drop for FilePool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        // Disconnecting the channel unparks a worker blocked on a full pool
        // and closes every file still queued; their paths stay on disk so a
        // later recovery pass accounts for the ids.
        drop(self.rx.take());

        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Replenisher worker
// ------------------------------------------------------------------------------------------------

/// State owned by the background replenisher thread.
struct Replenisher {
    directory: PathBuf,
    prefix: String,
    suffix: String,
    next_id: u64,
    pre_allocation_size: u64,
    tx: Sender<PooledFile>,
    shutdown: Arc<AtomicBool>,
}

impl Replenisher {
    fn run(mut self) {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }

            let id = self.next_id;
            self.next_id += 1;

            let name = format!("{}{:06}{}", self.prefix, id, self.suffix);
            let path = self.directory.join(name);

            let file = match self.create_file(&path) {
                Ok(file) => file,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "file pre-creation failed");
                    // Back off so a sick filesystem does not spin the worker.
                    thread::sleep(Duration::from_millis(100));
                    continue;
                }
            };

            // Blocks while the pool is full; that wait *is* the steady state.
            if self.tx.send(PooledFile { id, path, file }).is_err() {
                return; // pool dropped
            }
        }
    }

    fn create_file(&self, path: &Path) -> io::Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        if self.pre_allocation_size > 0 {
            // Portable ftruncate-style reservation. The cursor stays at 0,
            // so writers overwrite the reserved region from the start.
            file.set_len(self.pre_allocation_size)?;
        }

        Ok(file)
    }
}
