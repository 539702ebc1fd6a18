//! photoid CLI - face-identity clustering from the command line.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{ClusterCommand, ConfigCommand, PersonsCommand, RunCommand};

/// photoid CLI - group faces into persons without identity labels.
///
/// This tool works on embedding index files (photo -> faces -> embedding):
///   - Cluster an index and print the persons found
///   - Persist clusters as persons and faces in a local database
///   - Inspect persisted persons
///
/// Configuration is stored in ~/.photoid/ and supports multiple contexts,
/// similar to kubectl's context management.
#[derive(Parser)]
#[command(name = "photoid")]
#[command(about = "Face-identity clustering CLI tool")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.photoid/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Context name to use
    #[arg(short = 'c', long, global = true)]
    pub context: Option<String>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<String>,

    /// Input index file (YAML or JSON)
    #[arg(short = 'f', long = "file", global = true)]
    pub input: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage CLI configuration
    Config(ConfigCommand),
    /// Cluster an index file and print the result
    Cluster(ClusterCommand),
    /// Cluster an index file and store the result
    Run(RunCommand),
    /// List stored persons
    Persons(PersonsCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Config(cmd) => cmd.run(&cli),
        Commands::Cluster(cmd) => cmd.run(&cli),
        Commands::Run(cmd) => cmd.run(&cli),
        Commands::Persons(cmd) => cmd.run(&cli),
    }
}
