//! Download plan between two manifests.

use std::collections::BTreeSet;

use super::Manifest;

/// Files to fetch, copy from the local bundle, and delete to turn the cache
/// holding one manifest into the cache holding another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadPlan {
    pub to_download: BTreeSet<String>,
    pub to_copy: BTreeSet<String>,
    pub to_delete: BTreeSet<String>,
}

impl DownloadPlan {
    /// Nothing to fetch or delete: the cache already satisfies the new
    /// manifest, even if only bundle copies would change.
    pub fn is_noop(&self) -> bool {
        self.to_download.len() + self.to_delete.len() == 0
    }

    pub fn is_empty(&self) -> bool {
        self.is_noop() && self.to_copy.is_empty()
    }
}

/// Compute the plan from `old` to `new`.
///
/// `cached` holds the filenames currently present in the cache; a file the
/// old manifest claims but the cache lacks is fetched again. When `bundle`
/// is given, files it carries at exactly the new version are copied instead
/// of downloaded.
pub fn plan(
    old: &Manifest,
    new: &Manifest,
    cached: &BTreeSet<String>,
    bundle: Option<&Manifest>,
) -> DownloadPlan {
    let old_files = old.by_filename();
    let new_files = new.by_filename();
    let bundled = bundle.map(Manifest::by_filename).unwrap_or_default();

    let mut out = DownloadPlan::default();
    for (name, entry) in &new_files {
        let stale = match old_files.get(name) {
            None => true,
            Some(prev) => prev.version != entry.version,
        };
        if !stale && cached.contains(name) {
            continue;
        }
        match bundled.get(name) {
            Some(b) if b.version == entry.version => out.to_copy.insert(name.clone()),
            _ => out.to_download.insert(name.clone()),
        };
    }

    out.to_delete = cached
        .iter()
        .filter(|f| {
            !new_files.contains_key(*f) || out.to_download.contains(*f) || out.to_copy.contains(*f)
        })
        .cloned()
        .collect();
    out
}
