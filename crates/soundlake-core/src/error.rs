//! Error types and result aliases for soundlake.
//!
//! These errors cover the shared infrastructure (storage, locations,
//! configuration). The ETL crate wraps them in its own taxonomy.

/// The result type used throughout soundlake-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in shared soundlake operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A path or object was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A location URI could not be interpreted.
    #[error("invalid location '{uri}': {message}")]
    InvalidLocation {
        /// The offending URI.
        uri: String,
        /// Why it was rejected.
        message: String,
    },

    /// Configuration is missing or malformed.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new invalid-location error.
    #[must_use]
    pub fn invalid_location(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidLocation {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error means the object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
