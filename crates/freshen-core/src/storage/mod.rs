//! Storage provider: the file primitives the cache is built on.
//!
//! Paths handed to a provider are relative to its root and are normalized
//! with [`normalize`] before use. Writes go to a `.part` temp file first and
//! are renamed into place, so a crash never leaves a half-written file under
//! its final name.

mod local;
mod path;

pub use local::LocalStorage;
pub use path::{dirname, filename, is_contained, join, normalize};

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::StorageError;

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `app.js` → `app.js.part`).
pub fn temp_path(final_path: &std::path::Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Filters for [`StorageProvider::list`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListMode {
    pub recursive: bool,
    pub files_only: bool,
    pub dirs_only: bool,
}

impl ListMode {
    /// Every file below the directory.
    pub fn all_files() -> Self {
        Self {
            recursive: true,
            files_only: true,
            dirs_only: false,
        }
    }

    /// Asking for both filters at once disables filtering.
    fn effective(self) -> (bool, bool) {
        if self.files_only && self.dirs_only {
            (false, false)
        } else {
            (self.files_only, self.dirs_only)
        }
    }
}

/// File primitives used by the content cache.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    fn normalize(&self, path: &str) -> String {
        normalize(path)
    }

    /// Absolute on-disk location of `path`. Synchronous so transfers can be
    /// pointed at it before any I/O happens.
    fn local_path(&self, path: &str) -> PathBuf;

    /// URL under which the host can load `path`. Paths that already carry a
    /// scheme are returned unchanged.
    fn to_internal_url_sync(&self, path: &str) -> String;

    /// Create `dir` and all parents; returns its absolute path.
    async fn ensure_dir(&self, dir: &str) -> Result<PathBuf, StorageError>;

    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    async fn read_text(&self, path: &str) -> Result<String, StorageError>;

    /// Read as a `data:` URL (base64 payload).
    async fn read_data_url(&self, path: &str, mime: &str) -> Result<String, StorageError>;

    /// Write `data`, creating parent directories. `mime` is a hint only.
    async fn write(&self, path: &str, data: &[u8], mime: Option<&str>) -> Result<(), StorageError>;

    async fn move_file(&self, src: &str, dest: &str) -> Result<(), StorageError>;

    async fn copy_file(&self, src: &str, dest: &str) -> Result<(), StorageError>;

    /// Remove a file. Returns whether something was removed; a missing file is
    /// an error only when `must_exist` is set.
    async fn remove(&self, path: &str, must_exist: bool) -> Result<bool, StorageError>;

    /// Remove a directory and everything below it.
    async fn remove_dir(&self, dir: &str) -> Result<(), StorageError>;

    /// List entries below `dir` as root-relative paths; directories end in `/`.
    async fn list(&self, dir: &str, mode: ListMode) -> Result<Vec<String>, StorageError>;
}
