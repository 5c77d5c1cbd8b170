//! Local filesystem storage provider over `tokio::fs`.

use async_trait::async_trait;
use base64::Engine;
use std::path::{Path, PathBuf};

use super::{normalize, temp_path, ListMode, StorageProvider};
use crate::error::StorageError;

/// Storage rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root-relative path with `/` separators.
    fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    async fn ensure_parent(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io("create dir", parent, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    fn local_path(&self, path: &str) -> PathBuf {
        let normalized = normalize(path);
        let rel = normalized.trim_end_matches('/');
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    fn to_internal_url_sync(&self, path: &str) -> String {
        if path.contains("://") {
            return path.to_string();
        }
        let normalized = normalize(path);
        let local = self.local_path(&normalized);
        let url = if normalized.is_empty() || normalized.ends_with('/') {
            url::Url::from_directory_path(&local)
        } else {
            url::Url::from_file_path(&local)
        };
        // Relative roots cannot be expressed as file URLs; hand back the path.
        url.map(|u| u.to_string())
            .unwrap_or_else(|_| format!("file://{}", local.display()))
    }

    async fn ensure_dir(&self, dir: &str) -> Result<PathBuf, StorageError> {
        let path = self.local_path(dir);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| StorageError::io("create dir", &path, e))?;
        Ok(path)
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let p = self.local_path(path);
        match tokio::fs::metadata(&p).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io("stat", p, e)),
        }
    }

    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let p = self.local_path(path);
        tokio::fs::read(&p)
            .await
            .map_err(|e| StorageError::io("read", p, e))
    }

    async fn read_text(&self, path: &str) -> Result<String, StorageError> {
        let p = self.local_path(path);
        tokio::fs::read_to_string(&p)
            .await
            .map_err(|e| StorageError::io("read", p, e))
    }

    async fn read_data_url(&self, path: &str, mime: &str) -> Result<String, StorageError> {
        let bytes = self.read_bytes(path).await?;
        let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(format!("data:{mime};base64,{payload}"))
    }

    async fn write(&self, path: &str, data: &[u8], mime: Option<&str>) -> Result<(), StorageError> {
        let final_path = self.local_path(path);
        self.ensure_parent(&final_path).await?;
        let tmp = temp_path(&final_path);
        tracing::trace!(path = %final_path.display(), mime = mime.unwrap_or("-"), "write");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| StorageError::io("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &final_path)
            .await
            .map_err(|e| StorageError::io("rename", &final_path, e))
    }

    async fn move_file(&self, src: &str, dest: &str) -> Result<(), StorageError> {
        let from = self.local_path(src);
        let to = self.local_path(dest);
        self.ensure_parent(&to).await?;
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| StorageError::io("move", from, e))
    }

    async fn copy_file(&self, src: &str, dest: &str) -> Result<(), StorageError> {
        let from = self.local_path(src);
        let to = self.local_path(dest);
        self.ensure_parent(&to).await?;
        let tmp = temp_path(&to);
        tokio::fs::copy(&from, &tmp)
            .await
            .map_err(|e| StorageError::io("copy", &from, e))?;
        tokio::fs::rename(&tmp, &to)
            .await
            .map_err(|e| StorageError::io("rename", &to, e))
    }

    async fn remove(&self, path: &str, must_exist: bool) -> Result<bool, StorageError> {
        let p = self.local_path(path);
        match tokio::fs::remove_file(&p).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !must_exist => Ok(false),
            Err(e) => Err(StorageError::io("remove", p, e)),
        }
    }

    async fn remove_dir(&self, dir: &str) -> Result<(), StorageError> {
        let p = self.local_path(dir);
        match tokio::fs::remove_dir_all(&p).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io("remove dir", p, e)),
        }
    }

    async fn list(&self, dir: &str, mode: ListMode) -> Result<Vec<String>, StorageError> {
        let (files_only, dirs_only) = mode.effective();
        let mut out = Vec::new();
        let mut stack = vec![self.local_path(dir)];
        while let Some(d) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&d)
                .await
                .map_err(|e| StorageError::io("list", &d, e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::io("list", &d, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::io("stat", &path, e))?;
                if file_type.is_dir() {
                    if !files_only {
                        out.push(format!("{}/", self.relative(&path)));
                    }
                    if mode.recursive {
                        stack.push(path);
                    }
                } else if !dirs_only {
                    out.push(self.relative(&path));
                }
            }
        }
        out.sort();
        Ok(out)
    }
}
