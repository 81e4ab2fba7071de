//! Shared test utilities for soundlake integration tests.
//!
//! This crate provides:
//! - [`TracingMemoryBackend`]: In-memory storage with operation recording and
//!   failure injection
//! - [`TestContext`]: Input/output roots over one shared backend
//! - Factory functions and [`RawDataset`] for raw source files
//! - Read-back helpers and assertions over written tables
//!
//! # Example
//!
//! ```rust,ignore
//! use soundlake_test_utils::{next_song, song, RawDataset, TestContext};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let ctx = TestContext::new();
//!     RawDataset::new()
//!         .with_song(song("SO1", "AR1", "Artist", "Title", 200.0))
//!         .with_events("2018-11-01", [next_song("8", BASE_TS, "Artist", "Title", 200.0)])
//!         .write_to(&ctx.input)
//!         .await;
//!     let summary = ctx.session().run().await.unwrap();
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod fixtures;
pub mod storage;

pub use assertions::*;
pub use fixtures::*;
pub use storage::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("soundlake=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
