//! Error taxonomy for the update engine.
//!
//! Each collaborator gets its own error type so callers can tell a bad
//! configuration apart from a broken manifest or a failed transfer.
//! [`LoaderError`] is the umbrella returned by loader operations.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal problems detected while constructing a loader.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("loader id is empty")]
    MissingId,
    #[error("loader id `{0}` is already registered")]
    DuplicateId(String),
    #[error("loader `{0}` has no server_root")]
    MissingServerRoot(String),
    #[error("invalid URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{0} file(s) must be copied from the bundle but no bundle_root is configured")]
    NoBundleRoot(usize),
}

/// Failure to obtain or parse a remote manifest. Never mutates persisted state.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("fetch manifest {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: TransferError,
    },
    #[error("manifest is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("manifest has no \"files\" attribute")]
    MissingFiles,
    #[error("manifest file {0:?} escapes the cache root")]
    UnsafePath(String),
}

/// Storage provider failure, always tagged with the path involved.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),
}

impl StorageError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return StorageError::NotFound(path);
        }
        StorageError::Io { op, path, source }
    }
}

/// Error from a single transfer (or the manifest request).
#[derive(Debug, Error)]
pub enum TransferError {
    /// libcurl reported an error (timeout, connection, etc.).
    #[error("curl: {0}")]
    Curl(#[from] curl::Error),
    /// Response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Writing the received body failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid transfer URL: {0}")]
    InvalidUrl(String),
    /// Stopped through its abort handle. Never retried.
    #[error("transfer aborted")]
    Aborted,
    /// The blocking worker running the transfer went away.
    #[error("transfer worker failed: {0}")]
    Worker(String),
}

/// Terminal failure of a cache download batch: the files that did not make it
/// plus the first error seen.
#[derive(Debug, Error)]
#[error("{} file(s) failed to download: {source}", .files.len())]
pub struct DownloadFailed {
    pub files: Vec<String>,
    #[source]
    pub source: TransferError,
}

/// Durable key-value store failure.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state db: {0}")]
    Db(#[from] sqlx::Error),
    #[error("state encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("state dir: {0}")]
    Io(#[from] std::io::Error),
    #[error("state dir: {0}")]
    Xdg(#[from] xdg::BaseDirectoriesError),
}

/// Anything a loader operation can fail with.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Download(#[from] DownloadFailed),
    #[error("file is not served from the local cache: {0}")]
    NotLocal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_maps_to_not_found() {
        let e = StorageError::io(
            "read",
            "/tmp/nope",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(matches!(e, StorageError::NotFound(_)));
    }

    #[test]
    fn download_failed_message_counts_files() {
        let e = DownloadFailed {
            files: vec!["a.js".into(), "b.js".into()],
            source: TransferError::Http(404),
        };
        assert_eq!(e.to_string(), "2 file(s) failed to download: HTTP 404");
    }
}
