//! Durable per-loader state: the installed manifest and the fingerprint of
//! the last attempted update.

use std::sync::Arc;

use crate::error::StateError;
use crate::manifest::{Fingerprint, Manifest};
use crate::state_db::KeyValueStore;

pub(crate) struct PersistedState {
    store: Arc<dyn KeyValueStore>,
    manifest_key: String,
    fingerprint_key: String,
}

impl PersistedState {
    pub(crate) fn new(store: Arc<dyn KeyValueStore>, id: &str) -> Self {
        Self {
            store,
            manifest_key: format!("{id}_manifest"),
            fingerprint_key: format!("{id}_last_update_files"),
        }
    }

    /// Installed manifest, or the empty manifest when none (or an unreadable one) is stored.
    pub(crate) async fn manifest(&self) -> Result<Manifest, StateError> {
        let Some(raw) = self.store.get(&self.manifest_key).await? else {
            return Ok(Manifest::empty());
        };
        match serde_json::from_str::<Manifest>(&raw) {
            Ok(mut m) => {
                m.normalize();
                Ok(m)
            }
            Err(e) => {
                tracing::warn!(key = %self.manifest_key, error = %e, "stored manifest unreadable, starting empty");
                Ok(Manifest::empty())
            }
        }
    }

    pub(crate) async fn last_attempted(&self) -> Result<Option<Fingerprint>, StateError> {
        Ok(self
            .store
            .get(&self.fingerprint_key)
            .await?
            .map(Fingerprint::from_stored))
    }

    pub(crate) async fn set_manifest(&self, manifest: &Manifest) -> Result<(), StateError> {
        let json = serde_json::to_string(manifest)?;
        self.store.set(&self.manifest_key, &json).await
    }

    pub(crate) async fn set_last_attempted(&self, fp: &Fingerprint) -> Result<(), StateError> {
        self.store.set(&self.fingerprint_key, fp.as_str()).await
    }

    pub(crate) async fn erase(&self) -> Result<(), StateError> {
        self.store.remove(&self.fingerprint_key).await?;
        self.store.remove(&self.manifest_key).await
    }
}
