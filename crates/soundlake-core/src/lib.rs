//! # soundlake-core
//!
//! Shared infrastructure for the soundlake ETL job.
//!
//! - **Storage**: the [`StorageBackend`] contract with memory and
//!   `object_store`-backed implementations
//! - **Locations**: parsing of local paths and `s3://`/`s3a://` URIs into
//!   rooted storage handles
//! - **Globbing**: hierarchical `*`/`?` matching over object keys
//! - **Configuration**: explicit storage credentials
//! - **Observability**: logging initialization and span helpers
//! - **Error Types**: shared error definitions and result types
//!
//! ## Example
//!
//! ```rust
//! use soundlake_core::prelude::*;
//!
//! let location = StorageLocation::parse("s3a://udacity-dend/").unwrap();
//! assert_eq!(location.to_string(), "s3://udacity-dend");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod glob;
pub mod location;
pub mod observability;
pub mod rooted;
pub mod storage;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::StorageConfig;
    pub use crate::error::{Error, Result};
    pub use crate::glob::GlobPattern;
    pub use crate::location::StorageLocation;
    pub use crate::rooted::RootedStorage;
    pub use crate::storage::{MemoryBackend, ObjectMeta, ObjectStoreBackend, StorageBackend};
}

pub use config::StorageConfig;
pub use error::{Error, Result};
pub use glob::GlobPattern;
pub use location::StorageLocation;
pub use observability::{LogFormat, Redacted, etl_span, init_logging};
pub use rooted::RootedStorage;
pub use storage::{MemoryBackend, ObjectMeta, ObjectStoreBackend, StorageBackend};
