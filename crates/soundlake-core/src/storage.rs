//! Storage backend abstraction for object storage (S3, local filesystem, memory).
//!
//! The ETL job reads raw JSON from one location and overwrites Parquet tables
//! in another. Both sides go through [`StorageBackend`], so the transforms
//! never care whether data lives on a laptop disk or in a bucket.
//!
//! Paths are `/`-separated keys relative to the backend root. Listing order is
//! unspecified; callers that need determinism sort the result.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::path::Path as StorePath;
use object_store::{ObjectStore, PutPayload};

use crate::error::{Error, Result};

/// Metadata about a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object path (key).
    pub path: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modification timestamp.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Storage backend trait for object storage.
///
/// All storage backends (S3, local filesystem, memory) implement this trait.
/// The contract is designed for cloud object storage semantics: there are no
/// directories, only keys sharing a prefix.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Reads entire object.
    ///
    /// Returns `Error::NotFound` if object doesn't exist.
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Writes an object, replacing any existing content.
    async fn put(&self, path: &str, data: Bytes) -> Result<()>;

    /// Deletes an object.
    ///
    /// Succeeds even if object doesn't exist (idempotent).
    async fn delete(&self, path: &str) -> Result<()>;

    /// Lists objects with the given prefix.
    ///
    /// Returns empty vec if no objects match.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Gets object metadata without reading content.
    ///
    /// Returns `None` if object doesn't exist.
    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>>;
}

/// In-memory storage backend.
///
/// Thread-safe via `RwLock`. Used by tests and by `memory://` locations.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

impl MemoryBackend {
    /// Creates a new empty memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> Error {
        Error::Internal {
            message: "lock poisoned".into(),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;

        objects
            .get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        self.objects.write().map_err(|_| Self::poisoned())?.insert(
            path.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Self::poisoned())?
            .remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;

        Ok(objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(path, obj)| ObjectMeta {
                path: path.clone(),
                size: obj.data.len() as u64,
                last_modified: Some(obj.last_modified),
            })
            .collect())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;

        Ok(objects.get(path).map(|obj| ObjectMeta {
            path: path.to_string(),
            size: obj.data.len() as u64,
            last_modified: Some(obj.last_modified),
        }))
    }
}

/// Storage backend over any [`object_store::ObjectStore`].
///
/// Covers the local filesystem (`LocalFileSystem`) and S3-compatible
/// buckets (`AmazonS3`). Construction lives in [`crate::location`].
#[derive(Debug, Clone)]
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreBackend {
    /// Wraps an object store.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn store_path(path: &str) -> Result<StorePath> {
        StorePath::parse(path)
            .map_err(|e| Error::InvalidInput(format!("invalid object path '{path}': {e}")))
    }

    fn map_error(path: &str, op: &str, err: object_store::Error) -> Error {
        match err {
            object_store::Error::NotFound { .. } => {
                Error::NotFound(format!("object not found: {path}"))
            }
            other => Error::storage_with_source(format!("{op} failed for '{path}'"), other),
        }
    }

    #[allow(clippy::useless_conversion)]
    fn to_meta(meta: &object_store::ObjectMeta) -> ObjectMeta {
        ObjectMeta {
            path: meta.location.to_string(),
            size: u64::try_from(meta.size).unwrap_or(u64::MAX),
            last_modified: Some(meta.last_modified),
        }
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let location = Self::store_path(path)?;
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| Self::map_error(path, "get", e))?;
        result
            .bytes()
            .await
            .map_err(|e| Self::map_error(path, "get", e))
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        let location = Self::store_path(path)?;
        self.store
            .put(&location, PutPayload::from(data))
            .await
            .map_err(|e| Self::map_error(path, "put", e))?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let location = Self::store_path(path)?;
        match self.store.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(Self::map_error(path, "delete", e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        // object_store lists whole path segments; filter the partial
        // trailing segment ourselves so `list("a/b")` matches `a/bc`.
        let (dir, _) = prefix.rsplit_once('/').unwrap_or(("", prefix));
        let dir_path = if dir.is_empty() {
            None
        } else {
            Some(Self::store_path(dir)?)
        };

        let metas: Vec<object_store::ObjectMeta> = self
            .store
            .list(dir_path.as_ref())
            .try_collect()
            .await
            .map_err(|e| Self::map_error(prefix, "list", e))?;

        Ok(metas
            .iter()
            .map(Self::to_meta)
            .filter(|m| m.path.starts_with(prefix))
            .collect())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let location = Self::store_path(path)?;
        match self.store.head(&location).await {
            Ok(meta) => Ok(Some(Self::to_meta(&meta))),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(Self::map_error(path, "head", e)),
        }
    }
}
