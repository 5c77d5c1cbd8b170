//! Progress reporting for a batch of transfers (bytes done, fraction, rate).
//!
//! The cache feeds per-file transfer progress into a [`ProgressTracker`],
//! which folds it into one [`ProgressStats`] snapshot and forwards it only
//! when the overall fraction increases.

use std::sync::Arc;
use std::time::Instant;

use crate::transport::TransferProgress;

/// Caller-supplied callback for overall download progress.
pub type ProgressCallback = Arc<dyn Fn(&ProgressStats) + Send + Sync>;

/// Snapshot of progress for one cache download.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressStats {
    /// Bytes received so far across all files.
    pub bytes_done: u64,
    /// Sum of announced sizes (files that announced nothing count what they received).
    pub total_bytes: u64,
    pub files_done: usize,
    pub file_count: usize,
    /// Elapsed time since the batch started (seconds).
    pub elapsed_secs: f64,
}

impl ProgressStats {
    /// Fraction complete in [0.0, 1.0]. Only reaches 1.0 once every file is done.
    pub fn fraction(&self) -> f64 {
        if self.file_count == 0 || self.files_done >= self.file_count {
            return 1.0;
        }
        if self.total_bytes == 0 {
            return self.files_done as f64 / self.file_count as f64;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(0.999)
    }

    pub fn percentage(&self) -> f64 {
        self.fraction() * 100.0
    }

    /// Download rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if the rate is unknown).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct FileProgress {
    loaded: u64,
    total: Option<u64>,
    done: bool,
}

/// Folds per-file progress into monotonic overall reports.
pub struct ProgressTracker {
    files: Vec<FileProgress>,
    started: Instant,
    last_fraction: f64,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new(file_count: usize, callback: Option<ProgressCallback>) -> Self {
        Self {
            files: vec![FileProgress::default(); file_count],
            started: Instant::now(),
            last_fraction: -1.0,
            callback,
        }
    }

    /// Record progress for file `index`.
    pub fn update(&mut self, index: usize, p: TransferProgress) {
        if let Some(f) = self.files.get_mut(index) {
            f.loaded = p.loaded;
            if p.total.is_some() {
                f.total = p.total;
            }
        }
        self.emit();
    }

    /// Mark file `index` complete with its final size.
    pub fn complete(&mut self, index: usize, bytes: u64) {
        if let Some(f) = self.files.get_mut(index) {
            f.loaded = bytes;
            f.total = Some(bytes);
            f.done = true;
        }
        self.emit();
    }

    pub fn stats(&self) -> ProgressStats {
        let bytes_done = self.files.iter().map(|f| f.loaded).sum();
        let total_bytes = self
            .files
            .iter()
            .map(|f| f.total.unwrap_or(f.loaded).max(f.loaded))
            .sum();
        ProgressStats {
            bytes_done,
            total_bytes,
            files_done: self.files.iter().filter(|f| f.done).count(),
            file_count: self.files.len(),
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        }
    }

    fn emit(&mut self) {
        let stats = self.stats();
        let fraction = stats.fraction();
        if fraction <= self.last_fraction {
            return;
        }
        self.last_fraction = fraction;
        if let Some(cb) = &self.callback {
            cb(&stats);
        }
    }
}
