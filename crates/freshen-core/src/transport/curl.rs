//! libcurl transport. Each request runs on the blocking pool.

use async_trait::async_trait;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{ProgressFn, TransferProgress, Transport};
use crate::control::AbortHandle;
use crate::error::{StorageError, TransferError};
use crate::storage::temp_path;

/// Curl-backed transport. Transfers have no overall timeout; stalled
/// connections are cut by the low-speed limit.
#[derive(Debug, Clone)]
pub struct CurlTransport {
    pub connect_timeout: Duration,
    /// Abort when slower than `low_speed_limit` bytes/s for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
        }
    }
}

impl CurlTransport {
    fn easy(&self, url: &str) -> Result<curl::easy::Easy, TransferError> {
        let mut easy = curl::easy::Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.low_speed_limit(self.low_speed_limit)?;
        easy.low_speed_time(self.low_speed_time)?;
        Ok(easy)
    }
}

fn check_status(easy: &mut curl::easy::Easy) -> Result<(), TransferError> {
    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }
    Ok(())
}

fn perform_download(
    transport: &CurlTransport,
    url: &str,
    file: &mut File,
    tmp: &Path,
    progress: &ProgressFn,
    abort: &AbortHandle,
) -> Result<u64, TransferError> {
    let mut easy = transport.easy(url)?;
    easy.progress(true)?;
    let mut written = 0u64;
    let mut write_err: Option<std::io::Error> = None;
    let perform = {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| match file.write_all(data) {
            Ok(()) => {
                written += data.len() as u64;
                Ok(data.len())
            }
            Err(e) => {
                write_err = Some(e);
                Ok(0) // short write aborts the transfer
            }
        })?;
        transfer.progress_function(|dltotal, dlnow, _, _| {
            let total = (dltotal > 0.0).then_some(dltotal as u64);
            progress(TransferProgress {
                loaded: dlnow as u64,
                total,
            });
            !abort.is_aborted()
        })?;
        transfer.perform()
    };
    if abort.is_aborted() {
        return Err(TransferError::Aborted);
    }
    if let Some(e) = write_err {
        return Err(StorageError::io("write", tmp, e).into());
    }
    perform?;
    check_status(&mut easy)?;
    file.sync_all().map_err(|e| StorageError::io("sync", tmp, e))?;
    Ok(written)
}

fn download_blocking(
    transport: CurlTransport,
    url: String,
    dest: PathBuf,
    progress: ProgressFn,
    abort: AbortHandle,
) -> Result<u64, TransferError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::io("create dir", parent, e))?;
    }
    let tmp = temp_path(&dest);
    let mut file = File::create(&tmp).map_err(|e| StorageError::io("create", &tmp, e))?;

    match perform_download(&transport, &url, &mut file, &tmp, &progress, &abort) {
        Ok(written) => {
            drop(file);
            std::fs::rename(&tmp, &dest).map_err(|e| StorageError::io("rename", &dest, e))?;
            progress(TransferProgress {
                loaded: written,
                total: Some(written),
            });
            Ok(written)
        }
        Err(e) => {
            drop(file);
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
    }
}

fn fetch_blocking(
    transport: CurlTransport,
    url: String,
    timeout: Duration,
) -> Result<Vec<u8>, TransferError> {
    let mut easy = transport.easy(&url)?;
    easy.timeout(timeout)?;
    let mut body = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }
    check_status(&mut easy)?;
    Ok(body)
}

#[async_trait]
impl Transport for CurlTransport {
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: ProgressFn,
        abort: AbortHandle,
    ) -> Result<u64, TransferError> {
        let transport = self.clone();
        let url = url.to_string();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || download_blocking(transport, url, dest, progress, abort))
            .await
            .map_err(|e| TransferError::Worker(e.to_string()))?
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, TransferError> {
        let transport = self.clone();
        let url = url.to_string();
        tokio::task::spawn_blocking(move || fetch_blocking(transport, url, timeout))
            .await
            .map_err(|e| TransferError::Worker(e.to_string()))?
    }
}
