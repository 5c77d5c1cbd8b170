//! Bounded-concurrency transfer scheduler.
//!
//! Transfers wait in a deque: new work is appended at the tail, retries are
//! put back at the head so they never starve behind fresh work. At most
//! `concurrency` transfers run at once; every terminal resolution (success,
//! exhausted retries, abort) frees a slot and drains the queue.
//!
//! The queue lock is a plain `std::sync::Mutex` and is never held across an
//! await point.

mod progress;

pub use progress::{ProgressCallback, ProgressStats, ProgressTracker};

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};

use crate::control::AbortHandle;
use crate::error::TransferError;
use crate::retry::RetrySchedule;
use crate::transport::{ProgressFn, TransferProgress, Transport};

/// Default number of simultaneous transfers.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Per-transfer options.
#[derive(Clone, Default)]
pub struct TransferOptions {
    /// Retry delays; empty falls back to the scheduler default.
    pub retry: Vec<Duration>,
    /// Called on every progress report of this transfer.
    pub on_progress: Option<ProgressFn>,
}

struct Task {
    id: u64,
    url: String,
    dest: PathBuf,
    retry: RetrySchedule,
    attempts: u32,
    abort: AbortHandle,
    progress: Arc<watch::Sender<TransferProgress>>,
    on_progress: Option<ProgressFn>,
    done: oneshot::Sender<Result<u64, TransferError>>,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Task>,
    active: usize,
}

struct Shared {
    transport: Arc<dyn Transport>,
    concurrency: usize,
    default_retry: Vec<Duration>,
    next_id: AtomicU64,
    state: Mutex<QueueState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one enqueued transfer.
pub struct TransferHandle {
    id: u64,
    abort: AbortHandle,
    progress: watch::Receiver<TransferProgress>,
    done: oneshot::Receiver<Result<u64, TransferError>>,
}

impl TransferHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Abort the transfer. A queued transfer is dropped without running; a
    /// running one is asked to stop by the transport.
    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Subscribe to progress reports.
    pub fn subscribe(&self) -> watch::Receiver<TransferProgress> {
        self.progress.clone()
    }

    /// Wait for the terminal result: bytes written, or the last error.
    pub async fn finish(self) -> Result<u64, TransferError> {
        match self.done.await {
            Ok(result) => result,
            Err(_) => Err(TransferError::Worker("transfer task dropped".into())),
        }
    }
}

/// Shared transfer queue. Cloning shares the queue and its slot budget.
#[derive(Clone)]
pub struct TransferScheduler {
    shared: Arc<Shared>,
}

impl TransferScheduler {
    pub fn new(transport: Arc<dyn Transport>, concurrency: usize, default_retry: Vec<Duration>) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                concurrency: concurrency.max(1),
                default_retry,
                next_id: AtomicU64::new(1),
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.shared.concurrency
    }

    /// Transfers currently holding a slot (running or waiting out a retry delay).
    pub fn active(&self) -> usize {
        self.shared.lock().active
    }

    /// Transfers waiting for a slot.
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Queue a transfer of `url` into `dest`. Must be called from within a
    /// tokio runtime.
    pub fn enqueue(&self, url: &str, dest: &Path, options: TransferOptions) -> TransferHandle {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let retry = if options.retry.is_empty() {
            RetrySchedule::new(self.shared.default_retry.iter().copied())
        } else {
            RetrySchedule::new(options.retry)
        };
        let abort = AbortHandle::new();
        let (progress_tx, progress_rx) = watch::channel(TransferProgress::default());
        let (done_tx, done_rx) = oneshot::channel();

        let task = Task {
            id,
            url: url.to_string(),
            dest: dest.to_path_buf(),
            retry,
            attempts: 0,
            abort: abort.clone(),
            progress: Arc::new(progress_tx),
            on_progress: options.on_progress,
            done: done_tx,
        };
        tracing::debug!(id, url, dest = %dest.display(), "transfer queued");
        self.shared.lock().queue.push_back(task);
        drain(&self.shared);

        TransferHandle {
            id,
            abort,
            progress: progress_rx,
            done: done_rx,
        }
    }
}

/// Start queued tasks while slots are free. Aborted tasks are resolved
/// without taking a slot.
fn drain(shared: &Arc<Shared>) {
    let mut start = Vec::new();
    let mut dropped = Vec::new();
    {
        let mut st = shared.lock();
        while st.active < shared.concurrency {
            let Some(task) = st.queue.pop_front() else {
                break;
            };
            if task.abort.is_aborted() {
                dropped.push(task);
                continue;
            }
            st.active += 1;
            start.push(task);
        }
    }
    for task in dropped {
        tracing::debug!(id = task.id, url = %task.url, "dropping aborted transfer");
        let _ = task.done.send(Err(TransferError::Aborted));
    }
    for task in start {
        tokio::spawn(run_task(Arc::clone(shared), task));
    }
}

/// Release the task's slot, deliver its result, and refill.
fn finish(shared: &Arc<Shared>, task: Task, result: Result<u64, TransferError>) {
    {
        let mut st = shared.lock();
        st.active = st.active.saturating_sub(1);
    }
    match &result {
        Ok(bytes) => tracing::debug!(id = task.id, url = %task.url, bytes, "transfer done"),
        Err(e) => tracing::warn!(id = task.id, url = %task.url, attempts = task.attempts, error = %e, "transfer failed"),
    }
    let _ = task.done.send(result);
    drain(shared);
}

async fn run_task(shared: Arc<Shared>, mut task: Task) {
    task.attempts += 1;
    let progress: ProgressFn = {
        let tx = Arc::clone(&task.progress);
        let cb = task.on_progress.clone();
        Arc::new(move |p: TransferProgress| {
            tx.send_replace(p);
            if let Some(cb) = &cb {
                cb(p);
            }
        })
    };

    let result = shared
        .transport
        .download(&task.url, &task.dest, progress, task.abort.clone())
        .await;

    let err = match result {
        Ok(bytes) => return finish(&shared, task, Ok(bytes)),
        Err(_) if task.abort.is_aborted() => return finish(&shared, task, Err(TransferError::Aborted)),
        Err(e) => e,
    };
    let Some(delay) = task.retry.next_delay() else {
        return finish(&shared, task, Err(err));
    };

    tracing::info!(
        id = task.id,
        url = %task.url,
        attempt = task.attempts,
        retries_left = task.retry.remaining(),
        delay_ms = delay.as_millis() as u64,
        error = %err,
        "transfer failed, retrying"
    );
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    {
        let mut st = shared.lock();
        st.active = st.active.saturating_sub(1);
        st.queue.push_front(task);
    }
    drain(&shared);
}
