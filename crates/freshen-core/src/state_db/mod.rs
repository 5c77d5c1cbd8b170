//! Durable key-value state (SQLite via sqlx).
//!
//! Loaders persist their installed manifest and the fingerprint of the last
//! attempted update here, one row per key.

mod db;

pub use db::StateDb;

use async_trait::async_trait;

use crate::error::StateError;

/// Durable string key-value store. Values survive process restarts.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StateError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StateError>;
    /// Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StateError>;
}
