//! Observability infrastructure for soundlake.
//!
//! Structured logging with consistent spans: one span per table step,
//! carrying the table name and the run identifier.

use std::fmt;
use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt as fmt_layer, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `soundlake_etl=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer::layer().json().with_writer(std::io::stderr))
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer::layer().pretty().with_writer(std::io::stderr))
                    .init();
            }
        }
    });
}

/// Creates a span for one table step of an ETL run.
///
/// # Example
///
/// ```rust
/// use soundlake_core::observability::etl_span;
///
/// let span = etl_span("songs", "01J0000000000000000000000");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn etl_span(table: &str, run_id: &str) -> Span {
    tracing::info_span!("etl", table = table, run_id = run_id)
}

/// Wrapper that hides a secret value in `Debug` and `Display` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Redacted<T>(pub T);

impl<T> Redacted<T> {
    /// Returns the wrapped value.
    #[must_use]
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_succeeds() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json); // Second call should be no-op
    }

    #[test]
    fn test_etl_span_creates_span() {
        let span = etl_span("songplays", "run_123");
        let _guard = span.enter();
        tracing::info!("message in span");
    }

    #[test]
    fn test_redacted_hides_value() {
        let secret = Redacted("hunter2".to_string());
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(secret.to_string(), "[REDACTED]");
        assert_eq!(secret.expose(), "hunter2");
    }
}
