//! Storage credentials and connection settings.
//!
//! Credentials are carried in an explicit [`StorageConfig`] handed to the
//! backends at construction. Nothing here writes to the process environment.

use crate::error::{Error, Result};
use crate::observability::Redacted;

/// Access key id, checked before the standard `AWS_ACCESS_KEY_ID`.
pub const ENV_ACCESS_KEY_ID: &str = "SOUNDLAKE_AWS_ACCESS_KEY_ID";
/// Secret access key, checked before the standard `AWS_SECRET_ACCESS_KEY`.
pub const ENV_SECRET_ACCESS_KEY: &str = "SOUNDLAKE_AWS_SECRET_ACCESS_KEY";
/// Session token, checked before the standard `AWS_SESSION_TOKEN`.
pub const ENV_SESSION_TOKEN: &str = "SOUNDLAKE_AWS_SESSION_TOKEN";
/// Region, checked before the standard `AWS_REGION`.
pub const ENV_REGION: &str = "SOUNDLAKE_AWS_REGION";
/// Custom S3 endpoint (MinIO, LocalStack, ...).
pub const ENV_ENDPOINT: &str = "SOUNDLAKE_S3_ENDPOINT";
/// Allow plain-HTTP endpoints (`true`/`false`).
pub const ENV_ALLOW_HTTP: &str = "SOUNDLAKE_S3_ALLOW_HTTP";

/// Connection settings for remote object storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageConfig {
    /// Access key id.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_access_key: Option<Redacted<String>>,
    /// Temporary session token.
    pub session_token: Option<Redacted<String>>,
    /// Bucket region.
    pub region: Option<String>,
    /// Endpoint override for S3-compatible services.
    pub endpoint: Option<String>,
    /// Whether the endpoint may use plain HTTP.
    pub allow_http: bool,
}

impl StorageConfig {
    /// Loads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value is malformed or the
    /// credential pair is incomplete.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads settings with a custom environment source.
    ///
    /// Each `SOUNDLAKE_*` variable falls back to its standard `AWS_*`
    /// counterpart. Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value is malformed or the
    /// credential pair is incomplete.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |primary: &str, fallback: &str| {
            non_empty(get_env(primary)).or_else(|| non_empty(get_env(fallback)))
        };

        let allow_http = match non_empty(get_env(ENV_ALLOW_HTTP)) {
            None => false,
            Some(value) => parse_bool(ENV_ALLOW_HTTP, &value)?,
        };

        let config = Self {
            access_key_id: lookup(ENV_ACCESS_KEY_ID, "AWS_ACCESS_KEY_ID"),
            secret_access_key: lookup(ENV_SECRET_ACCESS_KEY, "AWS_SECRET_ACCESS_KEY")
                .map(Redacted),
            session_token: lookup(ENV_SESSION_TOKEN, "AWS_SESSION_TOKEN").map(Redacted),
            region: lookup(ENV_REGION, "AWS_REGION"),
            endpoint: lookup(ENV_ENDPOINT, "AWS_ENDPOINT_URL"),
            allow_http,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that credentials come as a complete pair.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if only one half of the key pair is set.
    pub fn validate(&self) -> Result<()> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(_), None) => Err(Error::configuration(
                "access key id is set but the secret access key is missing",
            )),
            (None, Some(_)) => Err(Error::configuration(
                "secret access key is set but the access key id is missing",
            )),
            _ => Ok(()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(Error::configuration(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}
