mod commands;
mod config;
mod scenarios;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

use commands::{list::ListCommand, run::RunCommand};
use scenarios::ScenarioTable;

#[derive(Parser)]
#[command(name = "cheney", version, about = "Cheney-style semispace garbage collector explorer")]
struct Cli {
    /// Path to a cheney.toml (searched upward from the current directory by default)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario
    Run(RunCommand),
    /// List the scenarios
    List(ListCommand),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;
    let scenarios = ScenarioTable::standard();

    match cli.command {
        Commands::Run(cmd) => cmd.run(&config, &scenarios)?,
        Commands::List(cmd) => cmd.run(&scenarios)?,
    }

    Ok(())
}
