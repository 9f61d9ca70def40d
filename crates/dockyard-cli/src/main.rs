//! Dockyard CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "dockyard")]
#[command(about = "Resolve Dockyard project configuration", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, short = 'c', global = true, env = "DOCKYARD_CONFIG")]
    config: Option<PathBuf>,

    /// Profile to apply
    #[arg(long, short = 'p', global = true, env = "DOCKYARD_PROFILE")]
    profile: Option<String>,

    /// Override a variable (repeatable)
    #[arg(long = "var", global = true, value_name = "NAME=VALUE")]
    vars: Vec<String>,

    /// Never prompt; fall back to default values
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved configuration as YAML
    Print,
    /// Resolve the configuration and check it against the schema
    Validate,
    /// List definitions in the configuration
    List {
        #[command(subcommand)]
        command: ListCommands,
    },
}

#[derive(Subcommand)]
enum ListCommands {
    /// List available profiles
    Profiles,
    /// List variable definitions
    Vars,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let options = commands::ResolveOptions {
        config: cli.config,
        profile: cli.profile,
        vars: cli.vars,
        interactive: !cli.yes,
    };

    match cli.command {
        Commands::Print => commands::print(&options)?,
        Commands::Validate => commands::validate(&options)?,
        Commands::List { command } => match command {
            ListCommands::Profiles => commands::list::profiles(&options)?,
            ListCommands::Vars => commands::list::vars(&options)?,
        },
    }

    Ok(())
}
