//! Shared fakes for unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::control::AbortHandle;
use crate::error::TransferError;
use crate::transport::{ProgressFn, TransferProgress, Transport};

/// In-memory HTTP stand-in: serves bodies by URL (query ignored), records
/// every request and fails URLs on demand with HTTP 500.
#[derive(Default)]
pub(crate) struct FakeServer {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    requests: Mutex<Vec<String>>,
}

impl FakeServer {
    pub(crate) fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body.into());
    }

    pub(crate) fn serve_json(&self, url: &str, value: serde_json::Value) {
        self.serve(url, value.to_string());
    }

    pub(crate) fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub(crate) fn heal(&self, url: &str) {
        self.failing.lock().unwrap().remove(url);
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn hits(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == url).count()
    }

    fn respond(&self, url: &str) -> Result<Vec<u8>, TransferError> {
        self.requests.lock().unwrap().push(url.to_string());
        let base = url.split('?').next().unwrap_or(url);
        if self.failing.lock().unwrap().contains(base) {
            return Err(TransferError::Http(500));
        }
        self.bodies
            .lock()
            .unwrap()
            .get(base)
            .cloned()
            .ok_or(TransferError::Http(404))
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: ProgressFn,
        _abort: AbortHandle,
    ) -> Result<u64, TransferError> {
        let body = self.respond(url)?;
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(dest, &body).unwrap();
        progress(TransferProgress {
            loaded: body.len() as u64,
            total: Some(body.len() as u64),
        });
        Ok(body.len() as u64)
    }

    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, TransferError> {
        self.respond(url)
    }
}
