//! Uniqueness of loader identities within a shared registry.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::ConfigError;

/// Set of loader ids currently in use. Clones share the same set.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id`. The claim is released when the returned guard drops.
    pub fn register(&self, id: &str) -> Result<Registration, ConfigError> {
        if id.trim().is_empty() {
            return Err(ConfigError::MissingId);
        }
        if !self.lock().insert(id.to_string()) {
            return Err(ConfigError::DuplicateId(id.to_string()));
        }
        Ok(Registration {
            id: id.to_string(),
            ids: Arc::clone(&self.ids),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held by a loader for as long as it owns its id.
pub struct Registration {
    id: String,
    ids: Arc<Mutex<HashSet<String>>>,
}

impl Registration {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
