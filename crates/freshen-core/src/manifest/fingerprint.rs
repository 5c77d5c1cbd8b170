//! Order-independent fingerprint of a manifest's file set.
//!
//! Only used to recognise a repeated update attempt. It says nothing about
//! file contents.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::FileEntry;
use crate::storage::normalize;

/// Hex SHA-256 over the sorted `filename@version` lines of a file set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(files: &BTreeMap<String, FileEntry>) -> Self {
        let mut pairs: Vec<(String, &str)> = files
            .values()
            .map(|e| (normalize(&e.filename), e.version.as_str()))
            .collect();
        pairs.sort();
        let mut hasher = Sha256::new();
        for (name, version) in pairs {
            hasher.update(name.as_bytes());
            hasher.update(b"@");
            hasher.update(version.as_bytes());
            hasher.update(b"\n");
        }
        Fingerprint(hex::encode(hasher.finalize()))
    }

    /// Rebuild from the stored string form.
    pub fn from_stored(s: impl Into<String>) -> Self {
        Fingerprint(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(entries: &[(&str, &str, &str)]) -> BTreeMap<String, FileEntry> {
        entries
            .iter()
            .map(|(id, name, v)| (id.to_string(), FileEntry::new(*name, *v)))
            .collect()
    }

    #[test]
    fn independent_of_ids_and_order() {
        let a = files(&[("x", "a.js", "1"), ("y", "b.js", "2")]);
        let b = files(&[("q", "/b.js", "2"), ("p", "a.js", "1")]);
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn changes_with_version_or_name() {
        let base = Fingerprint::of(&files(&[("a", "a.js", "1")]));
        assert_ne!(base, Fingerprint::of(&files(&[("a", "a.js", "2")])));
        assert_ne!(base, Fingerprint::of(&files(&[("a", "c.js", "1")])));
        assert_eq!(base.as_str().len(), 64);
    }
}
