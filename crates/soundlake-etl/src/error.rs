//! Error types for soundlake ETL runs.
//!
//! Every error surfaces to the caller of the run; nothing is retried. The
//! variants follow the stage that failed so an operator can tell a bad input
//! file from an unwritable destination at a glance.

use thiserror::Error;

/// Result type alias for ETL operations.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Errors that can occur during an ETL run.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Input files are missing, unreadable, or not valid JSON.
    #[error("source read error at {location}: {message}")]
    SourceRead {
        /// Pattern or file that failed.
        location: String,
        /// Description of the failure.
        message: String,
    },

    /// A record is valid JSON but does not fit the expected schema.
    #[error("schema error at {location} (record {record}): {message}")]
    Schema {
        /// File containing the record.
        location: String,
        /// 1-based position of the record within the file.
        record: usize,
        /// Which field was absent or mistyped.
        message: String,
    },

    /// A table could not be derived from its inputs.
    #[error("transform error in table '{table}': {message}")]
    Transform {
        /// Table being built.
        table: &'static str,
        /// Description of the violated precondition.
        message: String,
    },

    /// A table could not be encoded or persisted.
    #[error("write error in table '{table}': {message}")]
    Write {
        /// Table being written.
        table: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// A written table could not be listed or decoded on read-back.
    #[error("read error in table '{table}' at {location}: {message}")]
    Read {
        /// Table being read.
        table: &'static str,
        /// Directory or file that failed.
        location: String,
        /// Description of the failure.
        message: String,
    },

    /// Storage setup or access failed outside of a table write.
    #[error(transparent)]
    Storage(#[from] soundlake_core::Error),
}

impl EtlError {
    /// Creates a source read error.
    #[must_use]
    pub fn source_read(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceRead {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Creates a transform error for `table`.
    #[must_use]
    pub fn transform(table: &'static str, message: impl Into<String>) -> Self {
        Self::Transform {
            table,
            message: message.into(),
        }
    }

    /// Creates a write error for `table`.
    #[must_use]
    pub fn write(table: &'static str, message: impl Into<String>) -> Self {
        Self::Write {
            table,
            message: message.into(),
        }
    }

    /// Creates a read-back error for `table` at `location`.
    #[must_use]
    pub fn read(
        table: &'static str,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Read {
            table,
            location: location.into(),
            message: message.into(),
        }
    }

    /// Returns the table this error is attributed to, if any.
    #[must_use]
    pub fn table(&self) -> Option<&'static str> {
        match self {
            Self::Transform { table, .. } | Self::Write { table, .. } | Self::Read { table, .. } => {
                Some(table)
            }
            _ => None,
        }
    }
}
