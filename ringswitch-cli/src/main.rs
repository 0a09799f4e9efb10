//! ## ringswitch-cli
//! **Command-line front end**
//!
//! `simulate` links an engine to an in-memory interface, builds the
//! configured pipeline and pushes generated traffic through it. `check`
//! validates a configuration and shows the rule tree it produces.

use clap::Parser;
use ringswitch_telemetry::init_logging;

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;
    init_logging(&config.telemetry.log_level);

    match cli.command {
        Commands::Simulate(args) => commands::run_simulation(config, args).await,
        Commands::Check => commands::run_check(config),
    }
}
