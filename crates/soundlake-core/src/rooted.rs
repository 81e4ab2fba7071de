//! Root-prefixed storage with path validation.
//!
//! A run addresses everything relative to two roots: the input root holding
//! `song_data/` and `log_data/`, and the output root receiving the
//! `*.parquet` table directories. [`RootedStorage`] binds a backend to one
//! such root so callers only ever deal in relative keys.
//!
//! # Security
//!
//! - Relative paths are validated: no absolute paths, backslashes, control
//!   characters, or `.`/`..` segments.
//! - Listings never return keys outside the root.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::glob::GlobPattern;
use crate::storage::{ObjectMeta, StorageBackend};

/// Storage wrapper scoped to a root prefix.
#[derive(Clone)]
pub struct RootedStorage {
    backend: Arc<dyn StorageBackend>,
    root: String,
    display: String,
}

impl std::fmt::Debug for RootedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootedStorage")
            .field("root", &self.root)
            .field("display", &self.display)
            .finish_non_exhaustive()
    }
}

impl RootedStorage {
    /// Creates a rooted view over `backend`.
    ///
    /// `root` is a key prefix inside the backend (may be empty). Leading and
    /// trailing slashes are normalized away.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` contains traversal or control characters.
    pub fn new(backend: Arc<dyn StorageBackend>, root: impl AsRef<str>) -> Result<Self> {
        let root = root.as_ref().trim_matches('/').to_string();
        if !root.is_empty() {
            Self::validate_path(&root)?;
        }
        let display = root.clone();
        Ok(Self {
            backend,
            root,
            display,
        })
    }

    /// Overrides the human-readable location shown in logs (e.g. the URI).
    #[must_use]
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = display.into();
        self
    }

    /// Returns the human-readable location of the root.
    #[must_use]
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Returns the backend for advanced operations.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Validates a relative path for path traversal attacks.
    fn validate_path(path: &str) -> Result<()> {
        if path.starts_with('/') {
            return Err(Error::InvalidInput(format!(
                "absolute paths not allowed: {path}"
            )));
        }

        if path.contains('\\') {
            return Err(Error::InvalidInput(format!(
                "backslashes not allowed in paths: {path}"
            )));
        }

        if path.chars().any(char::is_control) {
            return Err(Error::InvalidInput(format!(
                "control characters not allowed in paths: {path}"
            )));
        }

        for segment in path.split('/') {
            if segment == "." || segment == ".." {
                return Err(Error::InvalidInput(format!(
                    "path traversal not allowed: {path}"
                )));
            }
        }

        Ok(())
    }

    fn full_path(&self, path: &str) -> Result<String> {
        Self::validate_path(path)?;
        if self.root.is_empty() {
            Ok(path.to_string())
        } else {
            Ok(format!("{}/{path}", self.root))
        }
    }

    fn relative<'a>(&self, full: &'a str) -> Option<&'a str> {
        if self.root.is_empty() {
            Some(full)
        } else {
            full.strip_prefix(self.root.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
        }
    }

    /// Reads an object relative to the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the read fails.
    pub async fn get(&self, path: &str) -> Result<Bytes> {
        self.backend.get(&self.full_path(path)?).await
    }

    /// Writes an object relative to the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the write fails.
    pub async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        self.backend.put(&self.full_path(path)?, data).await
    }

    /// Deletes an object relative to the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the delete fails.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.backend.delete(&self.full_path(path)?).await
    }

    /// Gets object metadata relative to the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the request fails.
    pub async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        self.backend.head(&self.full_path(path)?).await
    }

    /// Lists relative keys under `prefix`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix is invalid or the listing fails.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full_prefix = if prefix.is_empty() {
            if self.root.is_empty() {
                String::new()
            } else {
                format!("{}/", self.root)
            }
        } else {
            self.full_path(prefix)?
        };

        let mut paths: Vec<String> = self
            .backend
            .list(&full_prefix)
            .await?
            .into_iter()
            .filter_map(|meta| self.relative(&meta.path).map(str::to_string))
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Deletes every object under `prefix`. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or any delete fails.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let paths = self.list(prefix).await?;
        for path in &paths {
            self.delete(path).await?;
        }
        Ok(paths.len())
    }

    /// Returns relative keys matching a glob pattern, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is invalid or the listing fails.
    pub async fn glob(&self, pattern: &GlobPattern) -> Result<Vec<String>> {
        let candidates = self.list(&pattern.literal_prefix()).await?;
        Ok(candidates
            .into_iter()
            .filter(|path| pattern.matches(path))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    async fn seeded() -> (Arc<MemoryBackend>, RootedStorage) {
        let backend = Arc::new(MemoryBackend::new());
        for key in [
            "lake/raw/song_data/A/B/C/TRAAAAW128F429D538.json",
            "lake/raw/song_data/A/B/D/TRAAABD128F429CF47.json",
            "lake/raw/log_data/2018-11-01-events.json",
            "lake/raw/log_data/2018-11-02-events.json",
            "lake/rawother/log_data/2018-11-03-events.json",
        ] {
            backend.put(key, Bytes::from("{}")).await.unwrap();
        }
        let storage = RootedStorage::new(backend.clone(), "/lake/raw/").unwrap();
        (backend, storage)
    }

    #[tokio::test]
    async fn test_glob_resolves_relative_keys() {
        let (_, storage) = seeded().await;

        let songs = storage
            .glob(&GlobPattern::new("song_data/*/*/*/*.json").unwrap())
            .await
            .unwrap();
        assert_eq!(
            songs,
            vec![
                "song_data/A/B/C/TRAAAAW128F429D538.json",
                "song_data/A/B/D/TRAAABD128F429CF47.json",
            ]
        );

        let logs = storage
            .glob(&GlobPattern::new("log_data/*.json").unwrap())
            .await
            .unwrap();
        assert_eq!(logs.len(), 2, "sibling root must not leak into listing");
    }

    #[tokio::test]
    async fn test_path_traversal_prevention() {
        let (_, storage) = seeded().await;

        assert!(storage.get("../rawother/log_data/x.json").await.is_err());
        assert!(storage.put("/abs", Bytes::new()).await.is_err());
        assert!(storage.put("a\\b", Bytes::new()).await.is_err());
        assert!(storage.put("a/./b", Bytes::new()).await.is_err());
        assert!(storage.put("a\nb", Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_prefix_only_touches_prefix() {
        let (backend, storage) = seeded().await;

        let deleted = storage.delete_prefix("log_data/").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(storage.list("log_data/").await.unwrap().is_empty());
        assert_eq!(storage.list("song_data/").await.unwrap().len(), 2);
        assert!(backend
            .head("lake/rawother/log_data/2018-11-03-events.json")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_empty_root_uses_backend_keys() {
        let backend = Arc::new(MemoryBackend::new());
        let storage = RootedStorage::new(backend.clone(), "").unwrap();
        storage.put("songs.parquet/_SUCCESS", Bytes::new()).await.unwrap();
        assert!(backend.head("songs.parquet/_SUCCESS").await.unwrap().is_some());
        assert_eq!(storage.list("").await.unwrap(), vec!["songs.parquet/_SUCCESS"]);
    }

    #[test]
    fn test_invalid_root_rejected() {
        let backend = Arc::new(MemoryBackend::new());
        assert!(RootedStorage::new(backend, "lake/../etc").is_err());
    }
}
