//! Content cache: a filename-addressed local mirror of the server's files.
//!
//! Files live under `local_root` inside the storage provider. The cache keeps
//! an index of what is on disk (refreshed by [`ContentCache::list`]) and a
//! pending set that [`ContentCache::download`] drains through the transfer
//! scheduler.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use url::Url;

use crate::control::InFlight;
use crate::error::{ConfigError, DownloadFailed, StorageError, TransferError};
use crate::scheduler::{ProgressCallback, ProgressTracker, TransferOptions, TransferScheduler};
use crate::storage::{join, normalize, ListMode, StorageProvider, TEMP_SUFFIX};
use crate::transport::TransferProgress;

/// Parse a server root, adding the trailing `/` that URL joining needs.
pub fn server_root_url(root: &str) -> Result<Url, ConfigError> {
    let mut s = root.trim().to_string();
    if !s.ends_with('/') {
        s.push('/');
    }
    Url::parse(&s).map_err(|source| ConfigError::InvalidUrl { url: s, source })
}

pub struct ContentCache {
    storage: Arc<dyn StorageProvider>,
    scheduler: TransferScheduler,
    server_root: Url,
    local_root: String,
    retry: Vec<Duration>,
    cached: BTreeSet<String>,
    pending: BTreeSet<String>,
    in_flight: InFlight,
}

impl ContentCache {
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        scheduler: TransferScheduler,
        server_root: Url,
        local_root: &str,
        retry: Vec<Duration>,
    ) -> Self {
        let mut local_root = normalize(local_root);
        if !local_root.is_empty() && !local_root.ends_with('/') {
            local_root.push('/');
        }
        Self {
            storage,
            scheduler,
            server_root,
            local_root,
            retry,
            cached: BTreeSet::new(),
            pending: BTreeSet::new(),
            in_flight: InFlight::default(),
        }
    }

    pub fn local_root(&self) -> &str {
        &self.local_root
    }

    pub fn server_root(&self) -> &Url {
        &self.server_root
    }

    pub fn set_server_root(&mut self, root: &str) -> Result<(), ConfigError> {
        self.server_root = server_root_url(root)?;
        tracing::info!(server_root = %self.server_root, "cache server root changed");
        Ok(())
    }

    pub fn scheduler(&self) -> &TransferScheduler {
        &self.scheduler
    }

    /// Abort handles of the running download batch.
    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }

    /// Storage path of a cached file.
    fn storage_path(&self, filename: &str) -> String {
        join(&self.local_root, &normalize(filename))
    }

    pub fn to_server_url(&self, filename: &str) -> Result<Url, TransferError> {
        self.server_root
            .join(&normalize(filename))
            .map_err(|e| TransferError::InvalidUrl(format!("{filename}: {e}")))
    }

    /// Local URL the host loads `filename` from.
    pub fn to_internal_url(&self, filename: &str) -> String {
        self.storage.to_internal_url_sync(&self.storage_path(filename))
    }

    /// Local URL of the cache root.
    pub fn local_internal_url(&self) -> String {
        let root = if self.local_root.is_empty() {
            "./"
        } else {
            self.local_root.as_str()
        };
        self.storage.to_internal_url_sync(root)
    }

    /// Refresh the on-disk index and return it. Temp files are skipped.
    pub async fn list(&mut self) -> Result<BTreeSet<String>, StorageError> {
        self.storage.ensure_dir(&self.local_root).await?;
        let entries = self.storage.list(&self.local_root, ListMode::all_files()).await?;
        self.cached = entries
            .into_iter()
            .filter(|f| !f.ends_with(TEMP_SUFFIX))
            .map(|f| f.strip_prefix(&self.local_root).map(str::to_string).unwrap_or(f))
            .collect();
        Ok(self.cached.clone())
    }

    /// Whether `filename` was present at the last listing or has been
    /// downloaded since.
    pub fn is_cached(&self, filename: &str) -> bool {
        self.cached.contains(&normalize(filename))
    }

    /// Mark files for the next [`download`](Self::download).
    pub fn add<I, S>(&mut self, filenames: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for f in filenames {
            self.pending.insert(normalize(f.as_ref()));
        }
    }

    pub fn pending(&self) -> &BTreeSet<String> {
        &self.pending
    }

    /// Remove files from the cache. Missing files are skipped unless `must_exist`.
    pub async fn remove<I, S>(&mut self, filenames: I, must_exist: bool) -> Result<(), StorageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for f in filenames {
            let name = normalize(f.as_ref());
            self.storage.remove(&self.storage_path(&name), must_exist).await?;
            self.cached.remove(&name);
        }
        Ok(())
    }

    /// Copy `filename` from another provider (the local bundle) into the cache.
    pub async fn copy_in(
        &mut self,
        source: &dyn StorageProvider,
        filename: &str,
    ) -> Result<(), StorageError> {
        let name = normalize(filename);
        let data = source.read_bytes(&name).await?;
        self.storage.write(&self.storage_path(&name), &data, None).await?;
        self.cached.insert(name);
        Ok(())
    }

    /// Delete everything under the local root and start over empty.
    pub async fn clear(&mut self) -> Result<(), StorageError> {
        let root = if self.local_root.is_empty() {
            "./"
        } else {
            self.local_root.as_str()
        };
        self.storage.remove_dir(root).await?;
        self.storage.ensure_dir(root).await?;
        self.cached.clear();
        self.pending.clear();
        Ok(())
    }

    /// Download every pending file. Files that arrive leave the pending set;
    /// on failure the failed files stay pending and are reported with the
    /// first error.
    pub async fn download(&mut self, progress: Option<ProgressCallback>) -> Result<(), DownloadFailed> {
        let files: Vec<String> = self.pending.iter().cloned().collect();
        let tracker = Arc::new(Mutex::new(ProgressTracker::new(files.len(), progress)));
        if files.is_empty() {
            tracker.lock().unwrap_or_else(PoisonError::into_inner).complete(0, 0);
            return Ok(());
        }
        tracing::info!(count = files.len(), server_root = %self.server_root, "downloading files");

        let mut failed = Vec::new();
        let mut first_err: Option<TransferError> = None;
        let mut handles = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let url = match self.to_server_url(file) {
                Ok(u) => u,
                Err(e) => {
                    failed.push(file.clone());
                    first_err.get_or_insert(e);
                    continue;
                }
            };
            let dest = self.storage.local_path(&self.storage_path(file));
            let t = Arc::clone(&tracker);
            let options = TransferOptions {
                retry: self.retry.clone(),
                on_progress: Some(Arc::new(move |p: TransferProgress| {
                    t.lock().unwrap_or_else(PoisonError::into_inner).update(index, p);
                })),
            };
            let handle = self.scheduler.enqueue(url.as_str(), &dest, options);
            self.in_flight.register(file, handle.abort_handle());
            handles.push((index, file.clone(), handle));
        }

        for (index, file, handle) in handles {
            match handle.finish().await {
                Ok(bytes) => {
                    tracker
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .complete(index, bytes);
                    self.pending.remove(&file);
                    self.cached.insert(file);
                }
                Err(e) => {
                    failed.push(file);
                    first_err.get_or_insert(e);
                }
            }
        }
        self.in_flight.clear();

        match first_err {
            Some(source) => Err(DownloadFailed {
                files: failed,
                source,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::AbortHandle;
    use crate::scheduler::ProgressStats;
    use crate::storage::LocalStorage;
    use crate::transport::{ProgressFn, Transport};
    use async_trait::async_trait;
    use std::path::Path;

    /// Writes the URL path as the body; URLs containing "missing" 404.
    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        async fn download(
            &self,
            url: &str,
            dest: &Path,
            progress: ProgressFn,
            _abort: AbortHandle,
        ) -> Result<u64, TransferError> {
            if url.contains("missing") {
                return Err(TransferError::Http(404));
            }
            let body = url.as_bytes();
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(dest, body).unwrap();
            progress(TransferProgress {
                loaded: body.len() as u64,
                total: Some(body.len() as u64),
            });
            Ok(body.len() as u64)
        }

        async fn fetch(&self, _url: &str, _timeout: Duration) -> Result<Vec<u8>, TransferError> {
            Ok(Vec::new())
        }
    }

    fn cache(root: &Path) -> ContentCache {
        let storage = Arc::new(LocalStorage::new(root));
        let scheduler = TransferScheduler::new(Arc::new(EchoTransport), 2, Vec::new());
        ContentCache::new(
            storage,
            scheduler,
            server_root_url("http://srv/app").unwrap(),
            "js",
            Vec::new(),
        )
    }

    #[test]
    fn server_root_gets_trailing_slash() {
        assert_eq!(server_root_url("http://srv/app").unwrap().as_str(), "http://srv/app/");
        assert!(server_root_url("not a url").is_err());
    }

    #[tokio::test]
    async fn download_fills_cache_and_reports_full_progress() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = cache(dir.path());
        assert!(c.list().await.unwrap().is_empty());

        c.add(["a.js", "/lib/b.js"]);
        let last = Arc::new(Mutex::new(0.0));
        let sink = Arc::clone(&last);
        let cb: ProgressCallback =
            Arc::new(move |s: &ProgressStats| *sink.lock().unwrap() = s.fraction());
        c.download(Some(cb)).await.unwrap();

        assert!(c.pending().is_empty());
        assert_eq!(*last.lock().unwrap(), 1.0);
        assert!(c.is_cached("a.js"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("js/lib/b.js")).unwrap(),
            "http://srv/app/lib/b.js"
        );
        let listed = c.list().await.unwrap();
        assert_eq!(listed.into_iter().collect::<Vec<_>>(), vec!["a.js", "lib/b.js"]);
    }

    #[tokio::test]
    async fn failed_files_stay_pending() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = cache(dir.path());
        c.add(["ok.js", "missing.js"]);
        let err = c.download(None).await.unwrap_err();
        assert_eq!(err.files, vec!["missing.js"]);
        assert!(matches!(err.source, TransferError::Http(404)));
        assert!(c.is_cached("ok.js"));
        assert_eq!(c.pending().iter().collect::<Vec<_>>(), vec!["missing.js"]);
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = cache(dir.path());
        c.add(["a.js", "b.js"]);
        c.download(None).await.unwrap();
        c.remove(["a.js", "never.js"], false).await.unwrap();
        assert!(!c.is_cached("a.js"));
        assert!(c.remove(["never.js"], true).await.is_err());
        c.clear().await.unwrap();
        assert!(c.list().await.unwrap().is_empty());
        assert!(dir.path().join("js").is_dir());
    }

    #[tokio::test]
    async fn copy_in_from_bundle() {
        let bundle_dir = tempfile::tempdir().unwrap();
        let bundle = LocalStorage::new(bundle_dir.path());
        bundle.write("app.js", b"bundled", None).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut c = cache(dir.path());
        c.copy_in(&bundle, "app.js").await.unwrap();
        assert!(c.is_cached("app.js"));
        assert_eq!(std::fs::read(dir.path().join("js/app.js")).unwrap(), b"bundled");
    }
}
