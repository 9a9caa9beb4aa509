//! Codeblock CLI
//!
//! Command-line interface for codeblock - live mentor/student code exercises.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use codeblock_core::{Config, Role};

mod commands;
mod logging;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "codeblock")]
#[command(about = "Codeblock - live code exercises for mentors and students")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server
    Serve {
        /// Address to listen on (defaults to bind_addr from config)
        #[arg(long)]
        bind: Option<String>,
    },
    /// List the exercises in the lobby
    #[command(alias = "ls")]
    Blocks,
    /// Show an exercise and its current content
    Show {
        /// Block ID (e.g. async)
        id: String,
    },
    /// Check whether two files are equivalent solutions
    Check {
        /// File with the candidate submission
        candidate: PathBuf,
        /// File with the canonical solution
        solution: PathBuf,
    },
    /// Join a live exercise on the relay
    Join {
        /// Block ID (e.g. async)
        id: String,
        /// Role for this connection
        #[arg(short, long, value_enum)]
        role: RoleArg,
        /// Display name
        #[arg(short, long)]
        name: Option<String>,
        /// Relay URL (defaults to server_url from config)
        #[arg(long)]
        server: Option<String>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Mentor,
    Student,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Mentor => Role::Mentor,
            RoleArg::Student => Role::Student,
        }
    }
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, server_url, bind_addr, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_deref();

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    logging::init_logging(&config);

    match cli.command {
        Commands::Serve { bind } => commands::serve::run(&config, bind, &output).await,
        Commands::Blocks => commands::blocks::list(&config, &output),
        Commands::Show { id } => commands::blocks::show(&config, &id, &output),
        Commands::Check {
            candidate,
            solution,
        } => commands::check::run(&candidate, &solution, &output),
        Commands::Join {
            id,
            role,
            name,
            server,
        } => {
            let url = server.unwrap_or_else(|| config.server_url.clone());
            commands::join::run(&url, &id, role.into(), name, &output).await
        }
        Commands::Config { command } => match command {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(&key, &value, config_path, &output)
            }
        },
    }
}
