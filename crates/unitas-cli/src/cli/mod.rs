//! CLI command definitions for the `unitas` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod check;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use unitas_infra::sqlite::ConnectionPool;
use unitas_types::config::DatabaseConfig;

/// Inspect and verify a Unitas data-access configuration.
#[derive(Parser)]
#[command(name = "unitas", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "unitas.toml")]
    pub config: PathBuf,

    /// Connection URL, overriding the config file and environment.
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Output machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect, run a read-only unit of work and report the result.
    Check,

    /// Show the effective configuration and live pool status.
    Status,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

impl Cli {
    /// Log filter implied by `--quiet` and `-v`; `None` defers to the config file.
    pub fn log_filter(&self) -> Option<&'static str> {
        match self.verbose {
            0 if self.quiet => Some("error"),
            0 => None,
            1 => Some("info,unitas_infra=debug"),
            _ => Some("trace"),
        }
    }
}

/// Open a connected pool for `config`.
pub async fn open_pool(config: &DatabaseConfig) -> anyhow::Result<Arc<ConnectionPool>> {
    let pool = ConnectionPool::connect_with(config).await?;
    Ok(Arc::new(pool))
}
