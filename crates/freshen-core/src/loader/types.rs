//! Loader states, operation outcomes and the host-side collaborators.

use std::fmt;
use std::sync::Arc;

use crate::manifest::Manifest;
use crate::state_db::KeyValueStore;
use crate::storage::StorageProvider;
use crate::transport::Transport;

/// Where the loader is in its check / download / update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    Checking,
    NoUpdate,
    UpdateAvailable,
    Downloading,
    /// Every file of the pending manifest is stored; waiting for `update`.
    Ready,
    /// Committed and the host was asked to reload.
    Applied,
    /// An earlier attempt at the remote manifest never committed. Only
    /// `clear`/`reset` leave this state.
    Corrupt,
}

impl LoaderState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoaderState::Idle => "idle",
            LoaderState::Checking => "checking",
            LoaderState::NoUpdate => "no-update",
            LoaderState::UpdateAvailable => "update-available",
            LoaderState::Downloading => "downloading",
            LoaderState::Ready => "ready",
            LoaderState::Applied => "applied",
            LoaderState::Corrupt => "corrupt",
        }
    }
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful `check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    NoUpdate,
    UpdateAvailable,
    /// Do not retry automatically; recover with `reset`.
    Corrupt,
}

/// Result of a successful `download`.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    /// No update was pending, or it is already downloaded.
    NothingToDo,
    /// All files are in place; the manifest that `update` will commit.
    Ready(Manifest),
}

/// What `check` compares against.
#[derive(Debug, Clone)]
pub enum ManifestSource {
    /// The loader's manifest URL.
    Configured,
    /// Fetch from this URL, which also becomes the loader's manifest URL.
    Url(String),
    /// A manifest the caller already has.
    Value(serde_json::Value),
}

impl From<&str> for ManifestSource {
    fn from(url: &str) -> Self {
        ManifestSource::Url(url.to_string())
    }
}

impl From<serde_json::Value> for ManifestSource {
    fn from(value: serde_json::Value) -> Self {
        ManifestSource::Value(value)
    }
}

/// Host signal to restart its content from the committed manifest.
pub trait ReloadHook: Send + Sync {
    fn reload(&self);
}

impl<F> ReloadHook for F
where
    F: Fn() + Send + Sync,
{
    fn reload(&self) {
        self()
    }
}

/// External services a loader runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn StorageProvider>,
    pub transport: Arc<dyn Transport>,
    pub store: Arc<dyn KeyValueStore>,
    pub reload: Option<Arc<dyn ReloadHook>>,
}
