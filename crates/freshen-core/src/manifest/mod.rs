//! Manifest model: the versioned file set that makes up one installable
//! content version.
//!
//! A remote manifest looks like
//! `{ "files": { "<id>": { "filename": "...", "version": ... } }, "load": [...], "serverRoot": "..." }`.
//! Versions are opaque; numbers and strings are both accepted and compared
//! by their textual form.

mod diff;
mod fingerprint;

pub use diff::{plan, DownloadPlan};
pub use fingerprint::Fingerprint;

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::error::ManifestError;
use crate::storage::{is_contained, normalize};

/// Opaque version token of a file entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    pub fn new(v: impl Into<String>) -> Self {
        Version(v.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
            Flag(bool),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Version(s),
            Raw::Number(n) => Version(n.to_string()),
            Raw::Flag(b) => Version(b.to_string()),
        })
    }
}

/// One file of a manifest. Two entries describe the same content iff
/// filename and version are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    pub version: Version,
}

impl FileEntry {
    pub fn new(filename: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            version: Version::new(version),
        }
    }
}

/// A content version: files keyed by manifest id, plus the load order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub files: BTreeMap<String, FileEntry>,
    #[serde(default)]
    pub load: Vec<String>,
    /// Where the installed files live locally; set when a manifest is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(default, rename = "serverRoot", skip_serializing_if = "Option::is_none")]
    pub server_root: Option<String>,
}

impl Manifest {
    /// Manifest with no files; what a loader starts from on first run.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a manifest body. A body without a `files` key is rejected.
    pub fn from_slice(body: &[u8]) -> Result<Self, ManifestError> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    pub fn from_json(body: &str) -> Result<Self, ManifestError> {
        Self::from_slice(body.as_bytes())
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, ManifestError> {
        match value.get("files") {
            Some(files) if !files.is_null() => {}
            _ => return Err(ManifestError::MissingFiles),
        }
        let mut manifest: Manifest = serde_json::from_value(value)?;
        manifest.normalize();
        if let Some(bad) = manifest.files.values().find(|e| !is_contained(&e.filename)) {
            return Err(ManifestError::UnsafePath(bad.filename.clone()));
        }
        Ok(manifest)
    }

    /// Normalize every entry's filename in place.
    pub fn normalize(&mut self) {
        for entry in self.files.values_mut() {
            entry.filename = normalize(&entry.filename);
        }
    }

    /// Entries keyed by normalized filename. If two ids name the same file the
    /// later id (in key order) wins.
    pub fn by_filename(&self) -> BTreeMap<String, &FileEntry> {
        self.files
            .values()
            .map(|e| (normalize(&e.filename), e))
            .collect()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.files)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
