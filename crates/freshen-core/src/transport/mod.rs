//! Network transport used for manifest requests and file transfers.

mod curl;

pub use self::curl::CurlTransport;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::control::AbortHandle;
use crate::error::TransferError;

/// Bytes received so far for one transfer; `total` once the server announced it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferProgress {
    pub loaded: u64,
    pub total: Option<u64>,
}

/// Per-transfer progress callback.
pub type ProgressFn = Arc<dyn Fn(TransferProgress) + Send + Sync>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` into `dest`, replacing it only once the body is complete.
    /// Implementations must poll `abort` and fail with
    /// [`TransferError::Aborted`] once it is set. Returns bytes written.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: ProgressFn,
        abort: AbortHandle,
    ) -> Result<u64, TransferError>;

    /// GET `url` and return the whole body (used for manifests).
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, TransferError>;
}
