//! Unitas CLI entry point.
//!
//! Binary name: `unitas`
//!
//! Loads configuration, initializes tracing, then dispatches to the command
//! handler.

mod cli;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use unitas_infra::config::{apply_env_overrides, load_config};
use unitas_observe::tracing_setup::{init_tracing, shutdown_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need configuration
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "unitas", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = apply_env_overrides(load_config(&cli.config).await);
    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }

    init_tracing(&config.logging, cli.log_filter())
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = match cli.command {
        Commands::Check => cli::check::check(&config.database, cli.json, cli.quiet).await,
        Commands::Status => cli::status::status(&config, cli.json).await,
        Commands::Completions { .. } => Ok(()),
    };

    shutdown_tracing();
    result
}
