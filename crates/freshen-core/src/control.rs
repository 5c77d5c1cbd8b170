//! Abort tokens for individual transfers.
//!
//! Each queued transfer carries an [`AbortHandle`]. The scheduler drops
//! aborted tasks it has not started yet; running transfers poll the token
//! from the transport's progress callback and stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Shared abort flag for one transfer. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request abort. Idempotent.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Abort handles of the transfers a cache download currently has outstanding.
///
/// Obtained from the cache (or loader) before starting a download and usable
/// from another task while the download is running.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    handles: Arc<Mutex<Vec<(String, AbortHandle)>>>,
}

impl InFlight {
    pub(crate) fn register(&self, file: &str, handle: AbortHandle) {
        self.lock().push((file.to_string(), handle));
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    /// Filenames with a transfer still registered.
    pub fn files(&self) -> Vec<String> {
        self.lock().iter().map(|(f, _)| f.clone()).collect()
    }

    /// Abort the transfer for one file. Returns false if none is registered.
    pub fn abort(&self, file: &str) -> bool {
        let handles = self.lock();
        match handles.iter().find(|(f, _)| f == file) {
            Some((_, h)) => {
                h.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every registered transfer.
    pub fn abort_all(&self) {
        for (_, h) in self.lock().iter() {
            h.abort();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, AbortHandle)>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
