//! Update loader: the check → download → update state machine for one
//! content set.
//!
//! A loader compares the remote manifest with the installed one, downloads
//! the difference into its [`ContentCache`] and commits the new manifest in a
//! single durable write. A fingerprint of the last attempted file set is
//! persisted before any cache content changes; seeing that fingerprint again
//! without it having been committed puts the loader in
//! [`LoaderState::Corrupt`] instead of retrying forever.

mod registry;
mod state;
mod types;

pub use registry::{LoaderRegistry, Registration};
pub use types::{
    CheckOutcome, Collaborators, DownloadOutcome, LoaderState, ManifestSource, ReloadHook,
};

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

use crate::cache::{server_root_url, ContentCache};
use crate::config::LoaderConfig;
use crate::error::{ConfigError, LoaderError, ManifestError, TransferError};
use crate::manifest::{plan, DownloadPlan, Fingerprint, Manifest};
use crate::scheduler::{ProgressCallback, TransferScheduler};
use crate::storage::{LocalStorage, StorageProvider};
use crate::transport::Transport;
use state::PersistedState;

/// Append a millisecond timestamp as the query (or to the existing query).
fn with_cache_buster(url: &str, millis: u128) -> Result<String, ManifestError> {
    let mut parsed = Url::parse(url).map_err(|e| ManifestError::Fetch {
        url: url.to_string(),
        source: TransferError::InvalidUrl(e.to_string()),
    })?;
    let query = match parsed.query() {
        Some(q) if !q.is_empty() => format!("{q}&{millis}"),
        _ => millis.to_string(),
    };
    parsed.set_query(Some(&query));
    Ok(parsed.into())
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Local bundle shipped with the host, used to satisfy `to_copy`.
struct Bundle {
    storage: LocalStorage,
    manifest: Manifest,
}

pub struct UpdateLoader {
    id: String,
    _registration: Registration,
    state: LoaderState,
    manifest: Manifest,
    pending: Option<Manifest>,
    plan: DownloadPlan,
    last_attempted: Option<Fingerprint>,
    persisted: PersistedState,
    cache: ContentCache,
    transport: Arc<dyn Transport>,
    reload: Option<Arc<dyn ReloadHook>>,
    bundle: Option<Bundle>,
    manifest_url: String,
    cache_buster: bool,
    check_timeout: Duration,
    allow_server_root_from_manifest: bool,
}

impl UpdateLoader {
    /// Create the loader `id`, claiming the id in `registry` and reading its
    /// durable state.
    pub async fn open(
        id: &str,
        config: LoaderConfig,
        registry: &LoaderRegistry,
        collaborators: Collaborators,
    ) -> Result<Self, LoaderError> {
        config.validate(id)?;
        let registration = registry.register(id)?;
        let server_root = server_root_url(&config.normalized_server_root())?;

        let scheduler = TransferScheduler::new(
            Arc::clone(&collaborators.transport),
            config.effective_concurrency(),
            config.retry_delays(),
        );
        let cache = ContentCache::new(
            collaborators.storage,
            scheduler,
            server_root,
            &config.local_root(id),
            config.retry_delays(),
        );

        let persisted = PersistedState::new(collaborators.store, id);
        let manifest = persisted.manifest().await?;
        let last_attempted = persisted.last_attempted().await?;
        let bundle = load_bundle(&config).await;

        tracing::info!(
            loader = id,
            files = manifest.files.len(),
            manifest_url = %config.manifest_url(),
            "loader opened"
        );

        Ok(Self {
            id: id.to_string(),
            _registration: registration,
            state: LoaderState::Idle,
            manifest,
            pending: None,
            plan: DownloadPlan::default(),
            last_attempted,
            persisted,
            cache,
            transport: collaborators.transport,
            reload: collaborators.reload,
            bundle,
            manifest_url: config.manifest_url(),
            cache_buster: config.cache_buster,
            check_timeout: config.check_timeout(),
            allow_server_root_from_manifest: config.allow_server_root_from_manifest,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    /// The installed manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Manifest accepted by the last `check`, not yet committed.
    pub fn pending_manifest(&self) -> Option<&Manifest> {
        self.pending.as_ref()
    }

    pub fn plan(&self) -> &DownloadPlan {
        &self.plan
    }

    pub fn last_attempted(&self) -> Option<&Fingerprint> {
        self.last_attempted.as_ref()
    }

    pub fn can_download(&self) -> bool {
        self.pending.is_some() && self.state == LoaderState::UpdateAvailable
    }

    pub fn can_update(&self) -> bool {
        self.pending.is_some() && self.state == LoaderState::Ready
    }

    pub fn is_corrupt(&self) -> bool {
        self.state == LoaderState::Corrupt
    }

    pub fn manifest_url(&self) -> &str {
        &self.manifest_url
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ContentCache {
        &mut self.cache
    }

    /// Compare the remote manifest with what is installed and cached.
    ///
    /// A failed fetch or a malformed manifest leaves the loader as it was.
    pub async fn check(&mut self, source: ManifestSource) -> Result<CheckOutcome, LoaderError> {
        if self.state == LoaderState::Corrupt {
            tracing::warn!(loader = %self.id, "check skipped: loader is corrupt, reset required");
            return Ok(CheckOutcome::Corrupt);
        }
        let previous = self.state;
        self.state = LoaderState::Checking;
        match self.check_inner(source, previous).await {
            Ok(next) => {
                self.state = next;
                Ok(match next {
                    LoaderState::Corrupt => CheckOutcome::Corrupt,
                    LoaderState::UpdateAvailable | LoaderState::Ready => CheckOutcome::UpdateAvailable,
                    _ => CheckOutcome::NoUpdate,
                })
            }
            Err(e) => {
                self.state = previous;
                tracing::warn!(loader = %self.id, error = %e, "check failed");
                Err(e)
            }
        }
    }

    async fn check_inner(
        &mut self,
        source: ManifestSource,
        previous: LoaderState,
    ) -> Result<LoaderState, LoaderError> {
        let mut remote = match source {
            ManifestSource::Value(value) => Manifest::from_value(value)?,
            ManifestSource::Url(url) => {
                self.manifest_url = url;
                self.fetch_manifest().await?
            }
            ManifestSource::Configured => self.fetch_manifest().await?,
        };
        let cached = self.cache.list().await?;

        let fingerprint = remote.fingerprint();
        let pending_fp = self.pending.as_ref().map(Manifest::fingerprint);
        if previous == LoaderState::Ready && pending_fp.as_ref() == Some(&fingerprint) {
            tracing::debug!(loader = %self.id, "remote manifest already downloaded, awaiting update");
            return Ok(LoaderState::Ready);
        }
        if self.last_attempted.as_ref() == Some(&fingerprint) {
            if self.manifest.fingerprint() == fingerprint {
                self.discard_pending();
                tracing::debug!(loader = %self.id, "already on remote manifest");
                return Ok(LoaderState::NoUpdate);
            }
            self.discard_pending();
            tracing::warn!(
                loader = %self.id,
                fingerprint = %fingerprint,
                "new manifest available, but an earlier update attempt failed; will not download"
            );
            return Ok(LoaderState::Corrupt);
        }

        let bundle = self.bundle.as_ref().map(|b| &b.manifest);
        let next = plan(&self.manifest, &remote, &cached, bundle);
        if next.is_noop() {
            self.discard_pending();
            tracing::debug!(loader = %self.id, "no update needed");
            return Ok(LoaderState::NoUpdate);
        }

        tracing::info!(
            loader = %self.id,
            download = next.to_download.len(),
            copy = next.to_copy.len(),
            delete = next.to_delete.len(),
            "update available"
        );
        remote.root = Some(self.cache.local_internal_url());
        self.pending = Some(remote);
        self.plan = next;
        Ok(LoaderState::UpdateAvailable)
    }

    async fn fetch_manifest(&self) -> Result<Manifest, ManifestError> {
        let url = if self.cache_buster {
            with_cache_buster(&self.manifest_url, now_millis())?
        } else {
            self.manifest_url.clone()
        };
        tracing::debug!(loader = %self.id, url = %url, "fetching manifest");
        let body = self
            .transport
            .fetch(&url, self.check_timeout)
            .await
            .map_err(|source| ManifestError::Fetch { url, source })?;
        Manifest::from_slice(&body)
    }

    fn discard_pending(&mut self) {
        self.pending = None;
        self.plan = DownloadPlan::default();
    }

    /// Bring the cache in line with the pending manifest.
    ///
    /// On a failed transfer the failed files are removed from the cache, the
    /// loader stays in `UpdateAvailable` and `download` may be called again.
    pub async fn download(
        &mut self,
        progress: Option<ProgressCallback>,
    ) -> Result<DownloadOutcome, LoaderError> {
        if !self.can_download() {
            return Ok(DownloadOutcome::NothingToDo);
        }
        let Some(fingerprint) = self.pending.as_ref().map(Manifest::fingerprint) else {
            return Ok(DownloadOutcome::NothingToDo);
        };

        self.state = LoaderState::Downloading;
        let result = self.download_inner(&fingerprint, progress).await;
        match result {
            Ok(()) => {
                self.state = LoaderState::Ready;
                self.plan.to_download.clear();
                self.plan.to_delete.clear();
                tracing::info!(loader = %self.id, "update downloaded");
                match &self.pending {
                    Some(m) => Ok(DownloadOutcome::Ready(m.clone())),
                    None => Ok(DownloadOutcome::NothingToDo),
                }
            }
            Err(e) => {
                self.state = LoaderState::UpdateAvailable;
                if let LoaderError::Download(failed) = &e {
                    if let Err(err) = self.cache.remove(&failed.files, false).await {
                        tracing::warn!(loader = %self.id, error = %err, "could not remove failed files");
                    }
                    self.plan.to_download = failed.files.iter().cloned().collect();
                }
                tracing::warn!(loader = %self.id, error = %e, "download failed");
                Err(e)
            }
        }
    }

    async fn download_inner(
        &mut self,
        fingerprint: &Fingerprint,
        progress: Option<ProgressCallback>,
    ) -> Result<(), LoaderError> {
        // Guard first: a crash from here on is seen by the next check.
        self.persisted.set_last_attempted(fingerprint).await?;
        self.last_attempted = Some(fingerprint.clone());

        self.cache.remove(&self.plan.to_delete, false).await?;
        self.plan.to_delete.clear();

        if !self.plan.to_copy.is_empty() {
            let bundle = self
                .bundle
                .as_ref()
                .ok_or(ConfigError::NoBundleRoot(self.plan.to_copy.len()))?;
            for file in &self.plan.to_copy {
                self.cache.copy_in(&bundle.storage, file).await?;
            }
            self.plan.to_copy.clear();
        }

        if self.allow_server_root_from_manifest {
            if let Some(root) = self.pending.as_ref().and_then(|m| m.server_root.clone()) {
                self.cache.set_server_root(&root)?;
            }
        }

        self.cache.add(&self.plan.to_download);
        self.cache.download(progress).await?;
        Ok(())
    }

    /// Commit the downloaded manifest. Returns `false` unless a download
    /// completed since the last check.
    pub async fn update(&mut self, reload: bool) -> Result<bool, LoaderError> {
        if !self.can_update() {
            return Ok(false);
        }
        let Some(next) = self.pending.take() else {
            return Ok(false);
        };
        if let Err(e) = self.persisted.set_manifest(&next).await {
            self.pending = Some(next);
            return Err(e.into());
        }
        tracing::info!(loader = %self.id, files = next.files.len(), "update committed");
        self.manifest = next;
        self.plan = DownloadPlan::default();
        if reload {
            self.state = LoaderState::Applied;
            self.signal_reload();
        } else {
            self.state = LoaderState::Idle;
        }
        Ok(true)
    }

    /// Forget everything: durable state, cached files and the pending update.
    pub async fn clear(&mut self) -> Result<(), LoaderError> {
        self.manifest = Manifest::empty();
        self.discard_pending();
        self.last_attempted = None;
        self.state = LoaderState::Idle;
        self.persisted.erase().await?;
        self.cache.clear().await?;
        tracing::info!(loader = %self.id, "loader state cleared");
        Ok(())
    }

    /// `clear` followed by a host reload, issued even if the clear failed.
    pub async fn reset(&mut self) -> Result<(), LoaderError> {
        let result = self.clear().await;
        if let Err(e) = &result {
            tracing::warn!(loader = %self.id, error = %e, "clear failed during reset");
        }
        self.signal_reload();
        result
    }

    fn signal_reload(&self) {
        match &self.reload {
            Some(hook) => hook.reload(),
            None => tracing::debug!(loader = %self.id, "reload requested but no hook installed"),
        }
    }
}

async fn load_bundle(config: &LoaderConfig) -> Option<Bundle> {
    let root = config.bundle_root.as_ref()?;
    let storage = LocalStorage::new(root);
    let name = config.bundle_manifest.as_deref().unwrap_or("manifest.json");
    let raw = match storage.read_bytes(name).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(bundle = %root.display(), error = %e, "bundle manifest unavailable");
            return None;
        }
    };
    match Manifest::from_slice(&raw) {
        Ok(manifest) => Some(Bundle { storage, manifest }),
        Err(e) => {
            tracing::warn!(bundle = %root.display(), error = %e, "bundle manifest invalid");
            None
        }
    }
}
