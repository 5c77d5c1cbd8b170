//! freshen: differential, manifest-driven content updates.
//!
//! An [`loader::UpdateLoader`] keeps one local content set in step with a
//! remote manifest. It is built from small collaborators: a
//! [`storage::StorageProvider`], a [`transport::Transport`], a durable
//! [`state_db::KeyValueStore`] and an optional [`loader::ReloadHook`].

pub mod config;
pub mod logging;

pub mod cache;
pub mod control;
pub mod error;
pub mod host;
pub mod loader;
pub mod manifest;
pub mod retry;
pub mod scheduler;
pub mod state_db;
pub mod storage;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;
