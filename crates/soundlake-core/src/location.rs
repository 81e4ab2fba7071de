//! Resolution of input/output root locations to storage backends.
//!
//! Supported forms:
//!
//! | Location                      | Backend                          |
//! |-------------------------------|----------------------------------|
//! | `/data/lake`, `./lake`        | local filesystem                 |
//! | `file:///data/lake`           | local filesystem                 |
//! | `s3://bucket/prefix`          | S3-compatible object storage     |
//! | `s3a://bucket/prefix`         | same as `s3://`                  |
//! | `memory://prefix`             | fresh in-process memory store    |

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::rooted::RootedStorage;
use crate::storage::{MemoryBackend, ObjectStoreBackend};

/// A parsed storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// Directory on the local filesystem.
    Local {
        /// Directory path.
        path: PathBuf,
    },
    /// Bucket and key prefix on S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Key prefix inside the bucket (no leading/trailing slash).
        prefix: String,
    },
    /// In-process memory store.
    Memory {
        /// Key prefix inside the store.
        prefix: String,
    },
}

impl StorageLocation {
    /// Parses a location string.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLocation` for empty input, unknown schemes, or
    /// S3 URIs without a bucket.
    pub fn parse(uri: &str) -> Result<Self> {
        let trimmed = uri.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_location(uri, "location cannot be empty"));
        }

        let Some((scheme, rest)) = trimmed.split_once("://") else {
            return Ok(Self::Local {
                path: PathBuf::from(trimmed),
            });
        };

        match scheme.to_ascii_lowercase().as_str() {
            "file" => {
                if rest.is_empty() {
                    return Err(Error::invalid_location(uri, "file URI has no path"));
                }
                Ok(Self::Local {
                    path: PathBuf::from(rest),
                })
            }
            "s3" | "s3a" => {
                let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    return Err(Error::invalid_location(uri, "S3 URI has no bucket"));
                }
                Ok(Self::S3 {
                    bucket: bucket.to_string(),
                    prefix: prefix.trim_matches('/').to_string(),
                })
            }
            "memory" => Ok(Self::Memory {
                prefix: rest.trim_matches('/').to_string(),
            }),
            other => Err(Error::invalid_location(
                uri,
                format!("unsupported scheme '{other}'"),
            )),
        }
    }

    /// Opens a rooted storage handle for this location.
    ///
    /// When `create` is true, a missing local directory is created first
    /// (used for output roots).
    ///
    /// # Errors
    ///
    /// Returns an error if the local directory cannot be created or opened,
    /// or the S3 client cannot be configured.
    pub fn open(&self, config: &StorageConfig, create: bool) -> Result<RootedStorage> {
        let display = self.to_string();
        let storage = match self {
            Self::Local { path } => {
                if create {
                    std::fs::create_dir_all(path).map_err(|e| {
                        Error::storage_with_source(
                            format!("failed to create directory {}", path.display()),
                            e,
                        )
                    })?;
                }
                let fs = LocalFileSystem::new_with_prefix(path).map_err(|e| {
                    Error::storage_with_source(format!("failed to open {}", path.display()), e)
                })?;
                RootedStorage::new(Arc::new(ObjectStoreBackend::new(Arc::new(fs))), "")?
            }
            Self::S3 { bucket, prefix } => {
                config.validate()?;
                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(bucket)
                    .with_allow_http(config.allow_http);
                if let Some(key) = &config.access_key_id {
                    builder = builder.with_access_key_id(key);
                }
                if let Some(secret) = &config.secret_access_key {
                    builder = builder.with_secret_access_key(secret.expose());
                }
                if let Some(token) = &config.session_token {
                    builder = builder.with_token(token.expose());
                }
                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                let s3 = builder.build().map_err(|e| {
                    Error::configuration(format!("failed to configure S3 bucket '{bucket}': {e}"))
                })?;
                RootedStorage::new(Arc::new(ObjectStoreBackend::new(Arc::new(s3))), prefix)?
            }
            Self::Memory { prefix } => RootedStorage::new(Arc::new(MemoryBackend::new()), prefix)?,
        };
        Ok(storage.with_display(display))
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { path } => write!(f, "{}", path.display()),
            Self::S3 { bucket, prefix } if prefix.is_empty() => write!(f, "s3://{bucket}"),
            Self::S3 { bucket, prefix } => write!(f, "s3://{bucket}/{prefix}"),
            Self::Memory { prefix } => write!(f, "memory://{prefix}"),
        }
    }
}
