//! Host bootstrap helpers: one update cycle per loader, resolving the
//! installed files to local URLs, and picking the server to talk to.

use crate::error::LoaderError;
use crate::loader::{CheckOutcome, DownloadOutcome, ManifestSource, UpdateLoader};
use crate::scheduler::ProgressCallback;

/// What one [`run_cycle`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    UpToDate,
    Updated { fetched: usize, copied: usize, deleted: usize },
    /// The loader was corrupt and has been reset.
    Reset,
}

/// check → (corrupt ⇒ reset) → download → commit without reload.
pub async fn run_cycle(
    loader: &mut UpdateLoader,
    progress: Option<ProgressCallback>,
) -> Result<CycleReport, LoaderError> {
    match loader.check(ManifestSource::Configured).await? {
        CheckOutcome::NoUpdate => Ok(CycleReport::UpToDate),
        CheckOutcome::Corrupt => {
            tracing::warn!(loader = %loader.id(), "resetting corrupt loader");
            loader.reset().await?;
            Ok(CycleReport::Reset)
        }
        CheckOutcome::UpdateAvailable => {
            let plan = loader.plan().clone();
            if let DownloadOutcome::NothingToDo = loader.download(progress).await? {
                tracing::debug!(loader = %loader.id(), "update already downloaded");
            }
            loader.update(false).await?;
            Ok(CycleReport::Updated {
                fetched: plan.to_download.len(),
                copied: plan.to_copy.len(),
                deleted: plan.to_delete.len(),
            })
        }
    }
}

/// One installed file as the host should load it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadEntry {
    pub id: String,
    pub filename: String,
    pub url: String,
}

/// Installed files resolved to local URLs: `load` order first, then the rest
/// by id. A file that does not resolve to a local URL is an error.
pub fn load_entries(loader: &UpdateLoader) -> Result<Vec<LoadEntry>, LoaderError> {
    let manifest = loader.manifest();
    let mut ids: Vec<&String> = Vec::with_capacity(manifest.files.len());
    for id in &manifest.load {
        if !manifest.files.contains_key(id) {
            tracing::warn!(loader = %loader.id(), id = %id, "load entry missing from files");
            continue;
        }
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    for id in manifest.files.keys() {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(entry) = manifest.files.get(id) else {
            continue;
        };
        let url = loader.cache().to_internal_url(&entry.filename);
        if !url.starts_with("file://") {
            return Err(LoaderError::NotLocal(url));
        }
        out.push(LoadEntry {
            id: id.clone(),
            filename: entry.filename.clone(),
            url,
        });
    }
    Ok(out)
}

/// Server to use: the override when set, the default otherwise.
pub fn choose_server(preferred: Option<&str>, default: &str) -> String {
    match preferred.map(str::trim) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => default.to_string(),
    }
}
