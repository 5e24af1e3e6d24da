//! Command-line interface for imgvals.
//!
//! ```bash
//! # Resolve (and build, if needed) every image and print the service values
//! imgvals values --repo registry.example.com/demo --env production
//!
//! # Only some images
//! imgvals values web worker --repo registry.example.com/demo
//!
//! # Placeholder values without touching docker, the cache, or a registry
//! imgvals values --stub-tags
//! ```
//!
//! The YAML document goes to stdout; logs and diagnostics go to stderr.
//!
//! # Global options
//!
//! - `--verbose` / `-v`: debug logging
//! - `--quiet` / `-q`: errors only
//! - `--config` / `-c`: alternative global config file (`IMGVALS_CONFIG`)
//! - `--manifest-path`: explicit `imgvals.toml` (`IMGVALS_MANIFEST_PATH`)

mod values;


pub use values::ValuesCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Settings derived from the global flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Global config file override
    pub config_path: Option<PathBuf>,
    /// Manifest override
    pub manifest_path: Option<PathBuf>,
}

/// Top-level parser.
#[derive(Parser)]
#[command(
    name = "imgvals",
    about = "Resolve container images and print deployment service values",
    version,
    long_about = "imgvals decides which images of a project are missing from the build cache, \
                  builds them with bounded retries, and prints a YAML document describing \
                  image locations, namespace, environment, and source commit."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to an alternative global config file
    #[arg(short, long, global = true, env = "IMGVALS_CONFIG")]
    config: Option<PathBuf>,

    /// Path to imgvals.toml
    #[arg(long, global = true, env = "IMGVALS_MANIFEST_PATH")]
    manifest_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve images and print the service values document
    Values(ValuesCommand),
}

impl Cli {
    /// Settings for logging and config discovery.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        };
        CliConfig {
            log_level: log_level.to_string(),
            config_path: self.config.clone(),
            manifest_path: self.manifest_path.clone(),
        }
    }

    /// Run the selected command.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::Values(cmd) => cmd.execute(&config).await,
        }
    }
}
