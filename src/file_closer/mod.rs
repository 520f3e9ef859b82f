//! # File Closer Module
//!
//! Batched background close of retired output files.
//!
//! On large-file workloads the close itself — which forces the final flush
//! and fsync — dominates flush latency. The closer takes ownership of
//! finished files and retires them off the flush path: files accumulate in
//! a pending list, and once the list reaches the batch size the worker
//! swaps the whole list out and closes every entry in one sweep.
//!
//! Shutdown drains whatever is pending, so dropping the closer is a
//! durability point for every file scheduled before the drop.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fs::File;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, error, info, trace};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`FileCloser`] construction.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FileCloserError {
    /// Failed to start the closer thread.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ------------------------------------------------------------------------------------------------
// FileCloser Core
// ------------------------------------------------------------------------------------------------

/// Shared state between the scheduling side and the closer thread.
///
/// The mutex guards the pending list itself; the condvar wakes the worker
/// when the batch threshold is reached or shutdown begins.
#[derive(Debug)]
struct CloserShared {
    pending: Mutex<Vec<File>>,
    wakeup: Condvar,
    batch_size: usize,
    shutdown: AtomicBool,
}

/// Background worker that fsyncs and closes retired files in batches.
#[derive(Debug)]
pub struct FileCloser {
    shared: Arc<CloserShared>,

    /// Worker thread handle, joined on drop.
    worker: Option<JoinHandle<()>>,
}

impl FileCloser {
    /// Starts a closer that sweeps once `batch_size` files are pending.
    pub fn new(batch_size: usize) -> Result<Self, FileCloserError> {
        let shared = Arc::new(CloserShared {
            pending: Mutex::new(Vec::new()),
            wakeup: Condvar::new(),
            batch_size: batch_size.max(1),
            shutdown: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("blobcask-file-closer".into())
            .spawn(move || close_loop(&worker_shared))?;

        info!(batch_size, "file closer started");

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Hands a finished file over for background fsync + close.
    ///
    /// The worker is only woken when the pending list reaches the batch
    /// size; until then the file just sits in the list.
    pub fn schedule_close(&self, file: File) {
        let pending_len = {
            let mut pending = match self.shared.pending.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            pending.push(file);
            pending.len()
        };

        trace!(pending = pending_len, "file scheduled for close");

        if pending_len >= self.shared.batch_size || self.shared.shutdown.load(Ordering::SeqCst) {
            self.shared.wakeup.notify_one();
        }
    }
}

impl Drop for FileCloser {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.wakeup.notify_one();

        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Worker loop
// ------------------------------------------------------------------------------------------------

fn close_loop(shared: &CloserShared) {
    loop {
        let batch = {
            let mut pending = match shared.pending.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };

            while pending.len() < shared.batch_size && !shared.shutdown.load(Ordering::SeqCst) {
                pending = match shared.wakeup.wait(pending) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }

            if shared.shutdown.load(Ordering::SeqCst) && pending.is_empty() {
                return;
            }

            // Swap the whole list out so schedulers never wait on the
            // actual close I/O.
            std::mem::take(&mut *pending)
        };

        let count = batch.len();
        for file in batch {
            if let Err(e) = file.sync_all() {
                error!(error = %e, "fsync failed while retiring file");
            }
            // Dropping the handle is the close.
        }

        debug!(count, "closed batch of retired files");
    }
}
