//! Test storage implementations with operation tracing.
//!
//! Provides in-memory storage that records all operations for test assertions.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use soundlake_core::error::{Error, Result};
use soundlake_core::storage::{MemoryBackend, ObjectMeta, StorageBackend};

/// Record of a storage operation for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    /// Get operation.
    Get {
        /// Path that was read.
        path: String,
    },
    /// Head operation (metadata only).
    Head {
        /// Path that was checked.
        path: String,
    },
    /// Put operation.
    Put {
        /// Path that was written.
        path: String,
        /// Size of data written.
        size: usize,
    },
    /// Delete operation.
    Delete {
        /// Path that was deleted.
        path: String,
    },
    /// List operation.
    List {
        /// Prefix that was listed.
        prefix: String,
    },
}

impl StorageOp {
    /// Path or prefix the operation touched.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Get { path }
            | Self::Head { path }
            | Self::Put { path, .. }
            | Self::Delete { path } => path,
            Self::List { prefix } => prefix,
        }
    }

    /// Returns true for operations that modify storage.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Put { .. } | Self::Delete { .. })
    }
}

/// In-memory storage backend with operation tracing.
///
/// Records all operations for later assertion in tests, and fails any
/// operation whose path starts with an injected prefix.
#[derive(Debug, Clone, Default)]
pub struct TracingMemoryBackend {
    inner: MemoryBackend,
    operations: Arc<Mutex<Vec<StorageOp>>>,
    fail_paths: Arc<Mutex<Vec<String>>>,
}

impl TracingMemoryBackend {
    /// Creates a new empty tracing storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StorageOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Injects a failure for the given path prefix.
    pub fn inject_failure(&self, path: impl Into<String>) {
        self.fail_paths.lock().expect("lock").push(path.into());
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.fail_paths.lock().expect("lock").clear();
    }

    /// Returns all stored paths, sorted.
    pub async fn paths(&self) -> Vec<String> {
        self.inner
            .list("")
            .await
            .expect("memory list")
            .into_iter()
            .map(|m| m.path)
            .collect()
    }

    fn record(&self, op: StorageOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, path: &str) -> Result<()> {
        let fail_paths = self.fail_paths.lock().expect("lock");
        if fail_paths.iter().any(|p| path.starts_with(p.as_str())) {
            return Err(Error::Internal {
                message: format!("Injected failure for path: {path}"),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StorageBackend for TracingMemoryBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        self.check_failure(path)?;
        self.record(StorageOp::Get {
            path: path.to_string(),
        });
        self.inner.get(path).await
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        self.check_failure(path)?;
        self.record(StorageOp::Put {
            path: path.to_string(),
            size: data.len(),
        });
        self.inner.put(path, data).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.check_failure(path)?;
        self.record(StorageOp::Delete {
            path: path.to_string(),
        });
        self.inner.delete(path).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        self.check_failure(prefix)?;
        self.record(StorageOp::List {
            prefix: prefix.to_string(),
        });
        self.inner.list(prefix).await
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        self.check_failure(path)?;
        self.record(StorageOp::Head {
            path: path.to_string(),
        });
        self.inner.head(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_operations_in_order() {
        let storage = TracingMemoryBackend::new();
        storage.put("a/b", Bytes::from_static(b"xy")).await.unwrap();
        storage.get("a/b").await.unwrap();
        storage.delete("a/b").await.unwrap();

        let ops = storage.operations();
        assert_eq!(
            ops[0],
            StorageOp::Put {
                path: "a/b".into(),
                size: 2
            }
        );
        assert_eq!(ops.len(), 3);
        assert!(ops[2].is_mutation());
        assert!(storage.paths().await.is_empty());
    }

    #[tokio::test]
    async fn injected_failure_matches_prefix() {
        let storage = TracingMemoryBackend::new();
        storage.inject_failure("out/songplays");

        assert!(storage.put("out/songplays.parquet/x", Bytes::new()).await.is_err());
        assert!(storage.put("out/songs.parquet/x", Bytes::new()).await.is_ok());

        storage.clear_failures();
        assert!(storage.put("out/songplays.parquet/x", Bytes::new()).await.is_ok());
    }
}
