//! # soundlake-cli
//!
//! Command-line interface for the soundlake ETL job.
//!
//! ## Commands
//!
//! - `soundlake run` - Build all five tables from the raw sources
//! - `soundlake inspect` - Summarize the tables under an output root
//!
//! ## Configuration
//!
//! Locations accept local paths, `file://`, `s3://`/`s3a://` and `memory://`.
//! S3 credentials come from flags, then `SOUNDLAKE_AWS_*`, then the standard
//! `AWS_*` variables:
//!
//! - `SOUNDLAKE_INPUT` / `SOUNDLAKE_OUTPUT` - default roots
//! - `SOUNDLAKE_AWS_ACCESS_KEY_ID`, `SOUNDLAKE_AWS_SECRET_ACCESS_KEY`
//! - `SOUNDLAKE_AWS_REGION`, `SOUNDLAKE_S3_ENDPOINT`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use clap::{Parser, Subcommand};
use soundlake_core::{LogFormat, Redacted, StorageConfig};

#[allow(clippy::unnecessary_wraps)]
fn parse_secret(value: &str) -> Result<Redacted<String>, std::convert::Infallible> {
    Ok(Redacted(value.to_string()))
}

/// soundlake - song catalog and playback log ETL.
#[derive(Debug, Parser)]
#[command(name = "soundlake")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// S3 access key id.
    #[arg(long, global = true)]
    pub access_key_id: Option<String>,

    /// S3 secret access key.
    #[arg(long, global = true, value_parser = parse_secret)]
    pub secret_access_key: Option<Redacted<String>>,

    /// S3 region.
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// S3-compatible endpoint override.
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Log output format.
    #[arg(long, global = true, env = "SOUNDLAKE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormatArg,

    /// Result output format.
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration, with flags overriding the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment holds malformed settings or the
    /// resulting credential pair is incomplete.
    pub fn config(&self) -> soundlake_core::Result<Config> {
        self.config_with(|key| std::env::var(key).ok())
    }

    /// Like [`Cli::config`] with a custom environment source.
    ///
    /// # Errors
    ///
    /// See [`Cli::config`].
    pub fn config_with<F>(&self, get_env: F) -> soundlake_core::Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut storage = StorageConfig::from_env_with(get_env)?;
        if let Some(key) = &self.access_key_id {
            storage.access_key_id = Some(key.clone());
        }
        if let Some(secret) = &self.secret_access_key {
            storage.secret_access_key = Some(secret.clone());
        }
        if let Some(region) = &self.region {
            storage.region = Some(region.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            storage.endpoint = Some(endpoint.clone());
        }
        storage.validate()?;

        Ok(Config {
            storage,
            format: self.format.clone(),
        })
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build all tables from the raw sources.
    Run(commands::run::RunArgs),
    /// Summarize the tables under an output root.
    Inspect(commands::inspect::InspectArgs),
}

/// Log format flag values.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable logs.
    #[default]
    Pretty,
    /// JSON structured logs.
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
        }
    }
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Storage credentials and endpoint.
    pub storage: StorageConfig,
    /// Output format.
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_config_from_flags() {
        let cli = Cli::parse_from([
            "soundlake",
            "--access-key-id",
            "AKIA-test",
            "--secret-access-key",
            "shh",
            "--format",
            "json",
            "run",
            "--input",
            "s3a://udacity-dend/",
            "--output",
            "s3a://lake/",
        ]);

        let config = cli.config_with(|_| None).unwrap();
        assert_eq!(config.storage.access_key_id.as_deref(), Some("AKIA-test"));
        assert_eq!(
            config.storage.secret_access_key.as_ref().map(|s| s.expose().as_str()),
            Some("shh")
        );
        assert!(!format!("{:?}", config.storage).contains("shh"));
        assert!(!format!("{cli:?}").contains("shh"));
        assert!(matches!(config.format, OutputFormat::Json));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.input, "s3a://udacity-dend/");
                assert_eq!(args.output, "s3a://lake/");
            }
            Commands::Inspect(_) => panic!("expected run"),
        }
    }

    #[test]
    fn test_flags_override_environment() {
        let cli = Cli::parse_from([
            "soundlake",
            "--region",
            "us-west-2",
            "inspect",
            "--output",
            "./lake",
        ]);

        let config = cli
            .config_with(|key| match key {
                "AWS_REGION" => Some("eu-central-1".to_string()),
                "AWS_ACCESS_KEY_ID" => Some("env-key".to_string()),
                "AWS_SECRET_ACCESS_KEY" => Some("env-secret".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.storage.region.as_deref(), Some("us-west-2"));
        assert_eq!(config.storage.access_key_id.as_deref(), Some("env-key"));
    }

    #[test]
    fn test_incomplete_credentials_rejected() {
        let cli = Cli::parse_from([
            "soundlake",
            "--access-key-id",
            "only-half",
            "inspect",
            "--output",
            "./lake",
        ]);
        assert!(cli.config_with(|_| None).is_err());
    }
}
