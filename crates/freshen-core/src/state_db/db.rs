//! SQLite-backed state database.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use super::KeyValueStore;
use crate::error::StateError;

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the state database.
///
/// The default database lives under the XDG state directory:
/// `~/.local/state/freshen/state.db`.
#[derive(Clone)]
pub struct StateDb {
    pool: Pool<Sqlite>,
}

impl StateDb {
    /// Open (or create) the default state database and run migrations.
    pub async fn open_default() -> Result<Self, StateError> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("freshen")?;
        let state_dir = xdg_dirs.get_state_home();
        Self::open_at(state_dir.join("state.db")).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&uri)
            .await?;
        let db = StateDb { pool };
        db.migrate().await?;
        tracing::debug!(path = %path.display(), "state db opened");
        Ok(db)
    }

    /// In-memory database, gone when the handle is dropped. Used by tests and
    /// one-shot runs that must not touch the user's state.
    pub async fn open_memory() -> Result<Self, StateError> {
        // Single connection that never idles out, or the pool would hand back a fresh empty DB.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = StateDb { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), StateError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Keys starting with `prefix`, sorted.
    pub async fn keys(&self, prefix: &str) -> Result<Vec<String>, StateError> {
        let rows = sqlx::query(
            r#"
            SELECT key FROM kv
            WHERE substr(key, 1, length(?1)) = ?1
            ORDER BY key
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>("key")).collect())
    }
}

#[async_trait]
impl KeyValueStore for StateDb {
    async fn get(&self, key: &str) -> Result<Option<String>, StateError> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StateError> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StateError> {
        sqlx::query("DELETE FROM kv WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Current time as Unix seconds (for row timestamps).
fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_overwrite_remove() {
        let db = StateDb::open_memory().await.unwrap();
        assert_eq!(db.get("ui_manifest").await.unwrap(), None);

        db.set("ui_manifest", "{\"files\":{}}").await.unwrap();
        assert_eq!(db.get("ui_manifest").await.unwrap().as_deref(), Some("{\"files\":{}}"));

        db.set("ui_manifest", "v2").await.unwrap();
        assert_eq!(db.get("ui_manifest").await.unwrap().as_deref(), Some("v2"));

        db.remove("ui_manifest").await.unwrap();
        db.remove("ui_manifest").await.unwrap();
        assert_eq!(db.get("ui_manifest").await.unwrap(), None);
    }

    #[tokio::test]
    async fn keys_by_prefix() {
        let db = StateDb::open_memory().await.unwrap();
        db.set("ui_manifest", "a").await.unwrap();
        db.set("ui_last_update_files", "b").await.unwrap();
        db.set("source_manifest", "c").await.unwrap();
        assert_eq!(
            db.keys("ui_").await.unwrap(),
            vec!["ui_last_update_files", "ui_manifest"]
        );
    }

    #[tokio::test]
    async fn file_db_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested dir/state.db");
        {
            let db = StateDb::open_at(&path).await.unwrap();
            db.set("k", "v").await.unwrap();
        }
        let db = StateDb::open_at(&path).await.unwrap();
        assert_eq!(db.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn sqlite_uri_escapes_specials() {
        assert_eq!(
            path_to_sqlite_uri(Path::new("/tmp/a b#c.db")),
            "sqlite:///tmp/a%20b%23c.db"
        );
    }
}
